//! Input validation for site requests. Runs before any side effect.

use regex::Regex;
use std::sync::LazyLock;

use crate::errors::{DevwpError, Result};
use crate::store::Site;

// Lowercase hostname with at least two labels; labels may not start or end with '-'.
static HOSTNAME_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([a-z0-9]([a-z0-9-]{0,61}[a-z0-9])?\.)+[a-z0-9]([a-z0-9-]{0,61}[a-z0-9])?$")
        .unwrap()
});

pub fn validate_domain(domain: &str) -> Result<()> {
    if domain.len() > 253 || !HOSTNAME_REGEX.is_match(domain) {
        return Err(DevwpError::Validation(format!(
            "'{}' is not a valid domain (expected lowercase labels like demo.test)",
            domain
        )));
    }
    Ok(())
}

/// Relative path inside the site directory; no traversal, no absolute paths.
pub fn validate_web_root(web_root: &str) -> Result<()> {
    let trimmed = web_root.trim_matches('/');
    if web_root.starts_with('/')
        || trimmed.split('/').any(|part| part == ".." || part == ".")
        || web_root.contains('\\')
    {
        return Err(DevwpError::Validation(format!(
            "web root '{}' must be a relative path inside the site directory",
            web_root
        )));
    }
    Ok(())
}

pub fn validate_site(site: &Site) -> Result<()> {
    validate_domain(&site.domain)?;
    for alias in site.alias_list() {
        validate_domain(&alias)
            .map_err(|_| DevwpError::Validation(format!("alias '{}' is not a valid hostname", alias)))?;
    }
    if let Some(web_root) = site.web_root.as_deref() {
        validate_web_root(web_root)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_ordinary_domains() {
        for d in ["demo.test", "my-site.local", "a.b.c.localhost", "x1.dev"] {
            assert!(validate_domain(d).is_ok(), "{} should be valid", d);
        }
    }

    #[test]
    fn rejects_malformed_domains() {
        for d in ["", "demo", "Demo.test", "-demo.test", "demo-.test", "de mo.test", "../etc", "a..test", "demo.test;rm"] {
            assert!(
                matches!(validate_domain(d), Err(DevwpError::Validation(_))),
                "{} should be rejected",
                d
            );
        }
    }

    #[test]
    fn web_root_must_stay_inside() {
        assert!(validate_web_root("public").is_ok());
        assert!(validate_web_root("web/app/").is_ok());
        assert!(validate_web_root("/etc").is_err());
        assert!(validate_web_root("../other").is_err());
        assert!(validate_web_root("a/../../b").is_err());
    }

    #[test]
    fn site_validation_checks_aliases() {
        let ok = Site::new("demo.test").with_aliases("www.demo.test");
        assert!(validate_site(&ok).is_ok());

        let bad = Site::new("demo.test").with_aliases("www.demo.test BAD_alias");
        let err = validate_site(&bad).unwrap_err();
        assert!(err.to_string().contains("BAD_alias"));
    }
}
