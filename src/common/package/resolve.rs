//! Method resolution - which install method applies to a package on a target.

use super::catalog::Package;
use super::method::{InstallMethod, MethodKind};

/// The single method a package uses on the current target.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedMethod<'a> {
    pub method: &'a InstallMethod,
    pub kind: MethodKind,
}

/// Resolve the install method for `package` on `target`.
///
/// `None` means the package has no method for this target, which callers
/// report as skipped rather than failed.
pub fn resolve<'a>(package: &'a Package, target: &str) -> Option<ResolvedMethod<'a>> {
    package.method_for(target).map(|method| ResolvedMethod {
        method,
        kind: method.kind(),
    })
}
