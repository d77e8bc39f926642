//! Caddy configuration rendering for a single virtual host
//!
//! Produces one configuration file per app implementing three access
//! routes against the same backend:
//! 1. hostname-routed site (`app.domain`) with an active health check
//! 2. public path route (`/app/*`) on the shared listener, security
//!    response headers preserved
//! 3. embeddable path route (`/proxy/internal/app/*`) with frame and CSP
//!    response headers stripped so the dashboard can iframe the app
//!
//! The output is the proxy's native syntax, generated but never parsed
//! here. Rendered text is validated before the caller is allowed to write
//! it, since the app identity flows into the configuration.

use crate::error::{Result, VhostError};
use crate::sanitize::is_sanitized;
use std::fmt::Write;
use std::net::IpAddr;

/// Path prefix of the embeddable (header-stripping) route
pub const EMBED_ROUTE_PREFIX: &str = "/proxy/internal";

/// Client-identity headers forwarded on every route
const IDENTITY_HEADERS: [(&str, &str); 4] = [
    ("Host", "{host}"),
    ("X-Real-IP", "{remote_host}"),
    ("X-Forwarded-For", "{remote_host}"),
    ("X-Forwarded-Proto", "{scheme}"),
];

/// Security response headers stripped only on the embeddable route
const STRIPPED_HEADERS: [&str; 2] = ["X-Frame-Options", "Content-Security-Policy"];

/// Render the proxy configuration for one virtual host.
///
/// `name` must already be in sanitized form; `hostname` is the full
/// DNS name the hostname route matches on.
pub fn render(
    name: &str,
    hostname: &str,
    backend_ip: IpAddr,
    backend_port: u16,
    http_port: u16,
) -> Result<String> {
    if !is_sanitized(name) {
        return Err(VhostError::InvalidConfig(format!(
            "name {:?} is not in sanitized form",
            name
        )));
    }

    let upstream = upstream_address(backend_ip, backend_port);
    let mut out = String::new();

    let _ = writeln!(
        out,
        "# Virtual host for app '{}' - managed by vhostgate, do not edit",
        name
    );
    let _ = writeln!(out);

    // Route 1: hostname-routed site with active backend health check
    let _ = writeln!(out, "{} {{", hostname);
    let _ = writeln!(out, "\treverse_proxy {} {{", upstream);
    push_identity_headers(&mut out);
    let _ = writeln!(out, "\t\thealth_uri /");
    let _ = writeln!(out, "\t\thealth_interval 30s");
    let _ = writeln!(out, "\t}}");
    let _ = writeln!(out, "}}");
    let _ = writeln!(out);

    // Routes 2 and 3 share the platform's public listener
    let _ = writeln!(out, ":{} {{", http_port);

    // Route 3 first: its matcher is more specific than the public route
    let _ = writeln!(out, "\thandle_path {}/{}/* {{", EMBED_ROUTE_PREFIX, name);
    let _ = writeln!(out, "\t\treverse_proxy {} {{", upstream);
    push_identity_headers(&mut out);
    let _ = writeln!(
        out,
        "\t\t\theader_up X-Forwarded-Prefix {}/{}",
        EMBED_ROUTE_PREFIX, name
    );
    for header in STRIPPED_HEADERS {
        let _ = writeln!(out, "\t\t\theader_down -{}", header);
    }
    let _ = writeln!(out, "\t\t}}");
    let _ = writeln!(out, "\t}}");
    let _ = writeln!(out);

    // Route 2: public path route, security headers preserved
    let _ = writeln!(out, "\thandle_path /{}/* {{", name);
    let _ = writeln!(out, "\t\treverse_proxy {} {{", upstream);
    push_identity_headers(&mut out);
    let _ = writeln!(out, "\t\t\theader_up X-Forwarded-Prefix /{}", name);
    let _ = writeln!(out, "\t\t}}");
    let _ = writeln!(out, "\t}}");
    let _ = writeln!(out, "}}");

    validate(&out)?;
    Ok(out)
}

/// Upstream dial address; IPv6 literals need brackets
pub fn upstream_address(ip: IpAddr, port: u16) -> String {
    match ip {
        IpAddr::V4(v4) => format!("{}:{}", v4, port),
        IpAddr::V6(v6) => format!("[{}]:{}", v6, port),
    }
}

fn push_identity_headers(out: &mut String) {
    for (header, value) in IDENTITY_HEADERS {
        let _ = writeln!(out, "\t\t\theader_up {} {}", header, value);
    }
}

/// Validate rendered configuration text: balanced braces that never go
/// negative, and no control characters beyond newline and tab.
pub fn validate(text: &str) -> Result<()> {
    let mut depth: i32 = 0;

    for c in text.chars() {
        if c.is_control() && c != '\n' && c != '\t' {
            return Err(VhostError::InvalidConfig(format!(
                "control character {:?} in rendered output",
                c
            )));
        }
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth < 0 {
                    return Err(VhostError::InvalidConfig(
                        "unbalanced closing brace".to_string(),
                    ));
                }
            }
            _ => {}
        }
    }

    if depth != 0 {
        return Err(VhostError::InvalidConfig(format!(
            "{} unclosed brace(s)",
            depth
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rendered() -> String {
        render(
            "nginx-01",
            "nginx-01.prox.local",
            "10.20.0.101".parse().unwrap(),
            80,
            80,
        )
        .unwrap()
    }

    #[test]
    fn test_render_has_three_route_blocks() {
        let text = rendered();

        assert_eq!(text.matches("reverse_proxy ").count(), 3);
        assert!(text.contains("nginx-01.prox.local {"));
        assert!(text.contains("handle_path /nginx-01/* {"));
        assert!(text.contains("handle_path /proxy/internal/nginx-01/* {"));
    }

    #[test]
    fn test_render_targets_backend_on_all_routes() {
        let text = rendered();
        assert_eq!(text.matches("reverse_proxy 10.20.0.101:80 {").count(), 3);
    }

    #[test]
    fn test_render_identity_headers_on_all_routes() {
        let text = rendered();
        for header in ["Host", "X-Real-IP", "X-Forwarded-For", "X-Forwarded-Proto"] {
            assert_eq!(
                text.matches(&format!("header_up {} ", header)).count(),
                3,
                "{} missing from a route",
                header
            );
        }
    }

    #[test]
    fn test_render_strips_security_headers_only_on_embed_route() {
        let text = rendered();

        // Exactly one route strips them
        assert_eq!(text.matches("header_down -X-Frame-Options").count(), 1);
        assert_eq!(
            text.matches("header_down -Content-Security-Policy").count(),
            1
        );

        // And that route is the embeddable one
        let embed_start = text.find("handle_path /proxy/internal/").unwrap();
        let public_start = text.find("handle_path /nginx-01/*").unwrap();
        let strip_pos = text.find("header_down -X-Frame-Options").unwrap();
        assert!(embed_start < strip_pos && strip_pos < public_start);

        // Public route block contains no header_down
        let public_block = &text[public_start..];
        assert!(!public_block.contains("header_down"));
    }

    #[test]
    fn test_render_health_check_on_hostname_route_only() {
        let text = rendered();
        assert_eq!(text.matches("health_uri /").count(), 1);
        let health_pos = text.find("health_uri /").unwrap();
        let shared_listener_pos = text.find("\n:80 {").unwrap();
        assert!(health_pos < shared_listener_pos);
    }

    #[test]
    fn test_render_forwarded_prefix_on_path_routes() {
        let text = rendered();
        assert!(text.contains("header_up X-Forwarded-Prefix /nginx-01"));
        assert!(text.contains("header_up X-Forwarded-Prefix /proxy/internal/nginx-01"));
    }

    #[test]
    fn test_render_rejects_unsanitized_name() {
        let err = render(
            "My App",
            "my-app.prox.local",
            "10.0.0.1".parse().unwrap(),
            80,
            80,
        )
        .unwrap_err();
        assert!(matches!(err, VhostError::InvalidConfig(_)));

        // Directive injection attempts never reach the output
        assert!(render(
            "x }\nrogue {",
            "x.prox.local",
            "10.0.0.1".parse().unwrap(),
            80,
            80
        )
        .is_err());
    }

    #[test]
    fn test_render_ipv6_backend_is_bracketed() {
        let text = render(
            "v6app",
            "v6app.prox.local",
            "fd00::10".parse().unwrap(),
            8080,
            80,
        )
        .unwrap();
        assert!(text.contains("reverse_proxy [fd00::10]:8080 {"));
    }

    #[test]
    fn test_validate_rendered_output() {
        assert!(validate(&rendered()).is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_text() {
        assert!(validate("site {").is_err());
        assert!(validate("} site {").is_err());
        assert!(validate("a { b \u{0} }").is_err());
        assert!(validate("balanced { ok }").is_ok());
    }
}
