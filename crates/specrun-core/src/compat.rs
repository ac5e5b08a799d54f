//! Version compatibility between the runner and a context assembly.

use crate::assembly::LoadedAssembly;

/// Version of the spec library this runner ships.
pub const RUNNER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Short error reported to the host when the gate fails.
pub const INCOMPATIBLE_VERSION_MESSAGE: &str = "Incompatible specrun version";

/// Outcome of a compatibility check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompatibilityResult {
    pub success: bool,
    /// Human-readable explanation, empty on success.
    pub explanation: String,
    /// Short error message, empty on success.
    pub error_message: String,
}

impl CompatibilityResult {
    pub fn compatible() -> Self {
        Self {
            success: true,
            explanation: String::new(),
            error_message: String::new(),
        }
    }

    pub fn incompatible(explanation: impl Into<String>) -> Self {
        Self {
            success: false,
            explanation: explanation.into(),
            error_message: INCOMPATIBLE_VERSION_MESSAGE.to_string(),
        }
    }
}

/// Parsed `major.minor.patch` version.
///
/// Pre-release and build suffixes are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl Version {
    pub fn parse(version: &str) -> Result<Self, String> {
        let core = version
            .trim()
            .split(['-', '+'])
            .next()
            .unwrap_or_default();
        let mut parts = core.split('.');
        let mut next = |label: &str| -> Result<u32, String> {
            parts
                .next()
                .ok_or_else(|| format!("Invalid version string {version:?}: missing {label}"))?
                .parse::<u32>()
                .map_err(|err| format!("Invalid version string {version:?}: {err}"))
        };
        let parsed = Self {
            major: next("major")?,
            minor: next("minor")?,
            patch: next("patch")?,
        };
        if parts.next().is_some() {
            return Err(format!("Invalid version string {version:?}: too many components"));
        }
        Ok(parsed)
    }

    /// Whether two versions promise the same API.
    ///
    /// Same major; below 1.0 the minor must match as well.
    pub fn same_band(&self, other: &Version) -> bool {
        if self.major != other.major {
            return false;
        }
        self.major > 0 || self.minor == other.minor
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Checks the spec library version referenced by an assembly.
#[derive(Debug, Clone)]
pub struct VersionCompatibilityChecker {
    runner_version: String,
}

impl Default for VersionCompatibilityChecker {
    fn default() -> Self {
        Self::new(RUNNER_VERSION)
    }
}

impl VersionCompatibilityChecker {
    pub fn new(runner_version: impl Into<String>) -> Self {
        Self {
            runner_version: runner_version.into(),
        }
    }

    pub fn runner_version(&self) -> &str {
        &self.runner_version
    }

    /// Check a loaded assembly.
    pub fn check(&self, assembly: &LoadedAssembly) -> CompatibilityResult {
        self.check_version(assembly.name(), assembly.runner_version())
    }

    /// Check the version an assembly named `assembly_name` references.
    pub fn check_version(
        &self,
        assembly_name: &str,
        referenced: Option<&str>,
    ) -> CompatibilityResult {
        let Some(referenced) = referenced else {
            return CompatibilityResult::incompatible(format!(
                "Assembly {assembly_name} does not reference a specrun version. \
                 Rebuild it against specrun {}.",
                self.runner_version
            ));
        };

        let runner = match Version::parse(&self.runner_version) {
            Ok(version) => version,
            Err(err) => return CompatibilityResult::incompatible(err),
        };
        let assembly = match Version::parse(referenced) {
            Ok(version) => version,
            Err(err) => {
                return CompatibilityResult::incompatible(format!(
                    "Assembly {assembly_name} references an unreadable specrun version. {err}"
                ));
            }
        };

        if !runner.same_band(&assembly) {
            return CompatibilityResult::incompatible(format!(
                "Assembly {assembly_name} was built against specrun {assembly}, \
                 which is incompatible with runner version {runner}."
            ));
        }
        if assembly > runner {
            return CompatibilityResult::incompatible(format!(
                "Assembly {assembly_name} was built against specrun {assembly}, \
                 which is newer than runner version {runner}. Update the runner."
            ));
        }

        CompatibilityResult::compatible()
    }
}
