//! Headers every response should carry.

use crate::context::Context;
use crate::interceptor::{self, Configs, Flow};

/// Sets `X-Content-Type-Options: nosniff` and `X-XSS-Protection: 0`.
///
/// Both headers are claimed, so no handler can weaken them.
#[derive(Debug, Clone, Copy, Default)]
pub struct Interceptor;

impl interceptor::Interceptor for Interceptor {
    fn name(&self) -> &'static str {
        "static_headers"
    }

    fn before(&self, ctx: &mut Context, _configs: &Configs) -> Flow {
        let headers = ctx.headers_mut();
        for (name, value) in [
            ("X-Content-Type-Options", "nosniff"),
            ("X-XSS-Protection", "0"),
        ] {
            let result = headers
                .claim(name)
                .and_then(|claim| headers.set_claimed(&claim, [value]));
            if let Err(err) = result {
                return Flow::header_failure(self.name(), err);
            }
        }
        Flow::Continue
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{Method, StatusCode};
    use crate::router::ServeMuxConfig;
    use crate::test_utils::{get, ok_html};

    #[tokio::test]
    async fn headers_are_set_and_locked() {
        let mux = ServeMuxConfig::default()
            .intercept(Interceptor)
            .handle("/", Method::Get, |mut ctx: Context| async move {
                let tampered = ctx.headers_mut().set("X-XSS-Protection", "1");
                assert!(tampered.is_err());
                ctx.write(crate::response::SafeHtml::from_static("ok"))
            })
            .build();
        let res = mux.serve(get("/")).await;
        assert_eq!(res.status(), StatusCode::Ok);
        assert_eq!(res.headers().get("x-content-type-options"), Some("nosniff"));
        assert_eq!(res.headers().get("x-xss-protection"), Some("0"));
    }

    #[tokio::test]
    async fn double_registration_fails_closed() {
        let mux = ServeMuxConfig::default()
            .intercept(Interceptor)
            .intercept(Interceptor)
            .handle("/", Method::Get, ok_html)
            .build();
        let res = mux.serve(get("/")).await;
        assert_eq!(res.status(), StatusCode::InternalServerError);
    }
}
