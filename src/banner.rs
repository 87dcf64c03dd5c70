//! Startup banner for the webhook listener.

use std::path::Path;

use crate::consts::{AUTHOR, HOMEPAGE};

/// Listener configuration for display in the startup banner.
pub struct BannerInfo<'a> {
    pub base_url: &'a str,
    pub auth_method: &'a str,
    pub listen: &'a str,
    pub webhook_path: &'a str,
    pub signature_check: bool,
    pub callbacks: &'a [String],
    pub db: &'a Path,
}

pub fn render_banner(info: &BannerInfo) -> String {
    let callbacks = if info.callbacks.is_empty() {
        "none".to_string()
    } else {
        info.callbacks.join(", ")
    };
    format!(
        r#"
   ╔═══════════════════════════════════════╗
   ║          A I   S T U D I O            ║
   ║        webhook listener ready         ║
   ╚═══════════════════════════════════════╝

   version   {}
   by        {}
   home      {}
   studio    {} ({})
   listen    http://{}{}
   secret    {}
   callbacks {}
   db        {}
"#,
        env!("CARGO_PKG_VERSION"),
        AUTHOR,
        HOMEPAGE,
        info.base_url,
        info.auth_method,
        info.listen,
        info.webhook_path,
        if info.signature_check { "checked" } else { "NOT checked" },
        callbacks,
        info.db.display(),
    )
}

/// Print the startup banner with listener info.
pub fn print_banner(info: &BannerInfo) {
    println!("{}", render_banner(info));
}
