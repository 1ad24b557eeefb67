//! Mach-O load path rewriting for the built dylibs.
//!
//! `make install` records absolute install names (`<prefix>/lib/libssl...`)
//! in every dependent library. Rewriting them to `@loader_path/<file>` lets
//! the `dependencies/` and `build/` trees move as a unit.
//!
//! Rewrites run in a fixed order, dependency before dependent:
//!
//! 1. libssl: crypto
//! 2. libusbmuxd: plist
//! 3. libimobiledevice: ssl, crypto, plist, usbmuxd
//!
//! Each patched file is ad-hoc re-signed afterwards.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;
use tracing::{debug, warn};

use imd_schema::DylibNames;

use crate::error::InstallError;
use crate::layout::Layout;
use crate::reporter::Reporter;
use crate::step::{Step, StepError, StepRunner};

/// A library taking part in relocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Library {
    /// OpenSSL `libssl`.
    Ssl,
    /// OpenSSL `libcrypto`.
    Crypto,
    /// `libplist`.
    Plist,
    /// `libusbmuxd`.
    Usbmuxd,
    /// The final `libimobiledevice` build.
    Imobiledevice,
}

impl Library {
    /// Installed file name.
    pub fn file_name(self, dylibs: &DylibNames) -> &str {
        match self {
            Self::Ssl => &dylibs.ssl,
            Self::Crypto => &dylibs.crypto,
            Self::Plist => &dylibs.plist,
            Self::Usbmuxd => &dylibs.usbmuxd,
            Self::Imobiledevice => &dylibs.imobiledevice,
        }
    }

    /// Directory the library is installed into.
    pub fn dir(self, layout: &Layout) -> PathBuf {
        match self {
            Self::Imobiledevice => layout.build_dir().join("lib"),
            _ => layout.lib_dir(),
        }
    }
}

impl fmt::Display for Library {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ssl => "libssl",
            Self::Crypto => "libcrypto",
            Self::Plist => "libplist",
            Self::Usbmuxd => "libusbmuxd",
            Self::Imobiledevice => "libimobiledevice",
        })
    }
}

/// Rewrite the reference to `dependency` inside `target`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rewrite {
    /// Library whose load command is patched.
    pub target: Library,
    /// Library referenced by that load command.
    pub dependency: Library,
}

const fn rewrite(target: Library, dependency: Library) -> Rewrite {
    Rewrite { target, dependency }
}

/// The rewrite order for a libimobiledevice build.
pub const RELOCATION_ORDER: [Rewrite; 6] = [
    rewrite(Library::Ssl, Library::Crypto),
    rewrite(Library::Usbmuxd, Library::Plist),
    rewrite(Library::Imobiledevice, Library::Ssl),
    rewrite(Library::Imobiledevice, Library::Crypto),
    rewrite(Library::Imobiledevice, Library::Plist),
    rewrite(Library::Imobiledevice, Library::Usbmuxd),
];

/// Invalid relocation plan.
#[derive(Error, Debug)]
pub enum RelocationError {
    /// `dependency` is referenced before its own rewrites are done.
    #[error(
        "relocation order: {dependency} is rewritten in {target} before its own reference to {pending} is fixed"
    )]
    OutOfOrder {
        /// Library being patched.
        target: Library,
        /// Library referenced too early.
        dependency: Library,
        /// Reference inside `dependency` that is still unpatched.
        pending: Library,
    },
}

/// An ordered, validated list of rewrites.
#[derive(Debug, Clone)]
pub struct RelocationPlan {
    rewrites: Vec<Rewrite>,
}

impl Default for RelocationPlan {
    fn default() -> Self {
        Self {
            rewrites: RELOCATION_ORDER.to_vec(),
        }
    }
}

impl RelocationPlan {
    /// A plan over `rewrites`, rejected if any library is used as a
    /// dependency before all rewrites targeting it have run.
    ///
    /// # Errors
    ///
    /// Returns [`RelocationError::OutOfOrder`] naming the first violation.
    pub fn new(rewrites: Vec<Rewrite>) -> Result<Self, RelocationError> {
        let plan = Self { rewrites };
        plan.validate()?;
        Ok(plan)
    }

    /// Check the ordering constraint.
    ///
    /// # Errors
    ///
    /// Returns [`RelocationError::OutOfOrder`] naming the first violation.
    pub fn validate(&self) -> Result<(), RelocationError> {
        for (i, used) in self.rewrites.iter().enumerate() {
            if let Some(later) = self.rewrites[i + 1..]
                .iter()
                .find(|r| r.target == used.dependency)
            {
                return Err(RelocationError::OutOfOrder {
                    target: used.target,
                    dependency: used.dependency,
                    pending: later.dependency,
                });
            }
        }
        Ok(())
    }

    /// The rewrites in execution order.
    pub fn rewrites(&self) -> &[Rewrite] {
        &self.rewrites
    }

    /// `install_name_tool -change <old> <new> <file>` then `codesign` for
    /// each rewrite. The signing step tolerates failure.
    pub fn steps(&self, layout: &Layout, dylibs: &DylibNames) -> Vec<Step> {
        self.rewrites
            .iter()
            .flat_map(|r| {
                let dep = r.dependency.file_name(dylibs);
                let target = r.target.dir(layout).join(r.target.file_name(dylibs));
                let old = layout.lib_dir().join(dep);
                [
                    Step::new("install_name_tool")
                        .arg("-change")
                        .arg(old.to_string_lossy())
                        .arg(format!("@loader_path/{dep}"))
                        .arg(target.to_string_lossy()),
                    resign(&target),
                ]
            })
            .collect()
    }
}

/// `codesign -s - --force --preserve-metadata=...`
fn resign(path: &std::path::Path) -> Step {
    Step::new("codesign")
        .args([
            "-s",
            "-",
            "--force",
            "--preserve-metadata=entitlements,requirements,flags,runtime",
        ])
        .arg(path.to_string_lossy())
        .allow_failure()
}

/// Apply `plan` through `runner`.
///
/// The plan is validated first so a bad order runs nothing. A missing
/// `codesign` is logged and skipped; every other failure stops the run.
///
/// # Errors
///
/// Returns [`InstallError::Relocation`] for an invalid plan, or the first
/// `install_name_tool` failure.
pub async fn relocate<R, P>(
    plan: &RelocationPlan,
    layout: &Layout,
    dylibs: &DylibNames,
    runner: &R,
    reporter: &P,
) -> Result<(), InstallError>
where
    R: StepRunner + ?Sized,
    P: Reporter + ?Sized,
{
    plan.validate()?;
    for step in plan.steps(layout, dylibs) {
        debug!(command = %step, "relocating");
        if step.program == "install_name_tool" {
            reporter.step(&step.command_line());
            runner.run(&step).await?;
            continue;
        }
        match runner.run(&step).await {
            Ok(_) => {}
            Err(StepError::Spawn { source, .. }) => {
                warn!(error = %source, "codesign unavailable, skipping re-sign");
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}
