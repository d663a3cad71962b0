//! Repository documentation published on the replica.

use crate::config::DeploymentConfig;
use crate::system::quote;

pub const INDEX_FILE: &str = "index.html";
pub const KEY_BUNDLE: &str = "pubkeys.tar.gz";

/// HTML index listing every repository and linking the key bundle.
pub fn render_index(config: &DeploymentConfig) -> String {
    let mut html = String::new();
    html.push_str("<!DOCTYPE html>\n<html>\n<head>\n");
    html.push_str("<meta charset=\"utf-8\">\n");
    html.push_str(&format!("<title>{} repositories</title>\n", config.repo_org));
    html.push_str("</head>\n<body>\n");
    html.push_str(&format!("<h1>{} repositories</h1>\n<ul>\n", config.repo_org));
    for name in config.repo_names() {
        html.push_str(&format!("<li><code>{}</code></li>\n", name));
    }
    html.push_str("</ul>\n");
    html.push_str(&format!(
        "<p>Public keys for all repositories: <a href=\"{b}\">{b}</a></p>\n",
        b = KEY_BUNDLE
    ));
    html.push_str("</body>\n</html>\n");
    html
}

/// Remote destination of the index page.
pub fn index_path(config: &DeploymentConfig) -> String {
    format!("{}/{}", config.layout.web_root.trim_end_matches('/'), INDEX_FILE)
}

/// Build the key bundle on the replica from its distributed keys.
pub fn bundle_command(config: &DeploymentConfig) -> String {
    let bundle = format!("{}/{}", config.layout.web_root.trim_end_matches('/'), KEY_BUNDLE);
    format!(
        "cd {} && tar -czf {} *.pub",
        quote(&config.layout.key_dir),
        quote(&bundle)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::minimal_raw;

    #[test]
    fn test_render_index_lists_repos() {
        let config = minimal_raw().resolve().unwrap();
        let html = render_index(&config);
        assert!(html.contains("<li><code>software.example.org</code></li>"));
        assert!(html.contains("<li><code>data.example.org</code></li>"));
        assert!(html.contains("href=\"pubkeys.tar.gz\""));
    }

    #[test]
    fn test_bundle_command() {
        let config = minimal_raw().resolve().unwrap();
        assert_eq!(
            bundle_command(&config),
            "cd /etc/cvmfs/keys && tar -czf /var/www/html/pubkeys.tar.gz *.pub"
        );
        assert_eq!(index_path(&config), "/var/www/html/index.html");
    }
}
