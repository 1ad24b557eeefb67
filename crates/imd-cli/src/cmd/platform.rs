//! Platform command

use anyhow::Result;
use crossterm::style::Stylize;

use imd_core::Layout;

use super::{resolve_platform, resolve_root};
use crate::PlatformArgs;

/// Print the resolved platform and the OpenSSL `Configure` line it maps to.
pub fn platform(args: &PlatformArgs) -> Result<()> {
    let platform = resolve_platform(args)?;
    let layout = Layout::new(resolve_root(args)?);

    let arch = platform.arch.map_or(platform.machine.as_str(), |a| a.as_str());
    row("os", &platform.system_name);
    row("family", platform.os.as_str());
    row("arch", arch);
    row("target", &platform.openssl.label.bold().to_string());
    row(
        "configure",
        &platform.openssl.configure_command(&layout.install_dir()),
    );
    Ok(())
}

fn row(key: &str, value: &str) {
    println!("{} {value}", format!("{key:<10}").dark_grey());
}
