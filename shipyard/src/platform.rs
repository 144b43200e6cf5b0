//! The table of platforms/architectures/formats we know how to build
//!
//! Everything user-facing about platforms and architectures gets funneled through
//! [`normalize_platform`][] and [`normalize_arch`][] before it touches the [`SupportTable`][],
//! so aliases like `x86_64` and `aarch64` never leak into paths or toolchain env vars.

use shipyard_schema::PackageFormat;

/// Name of the linux platform
pub const PLATFORM_LINUX: &str = "linux";
/// Name of the macOS platform (as the Go toolchain spells it)
pub const PLATFORM_DARWIN: &str = "darwin";
/// Name of the windows platform
pub const PLATFORM_WINDOWS: &str = "windows";
/// Name of the freebsd platform
pub const PLATFORM_FREEBSD: &str = "freebsd";

/// 64-bit x86
pub const ARCH_AMD64: &str = "amd64";
/// 32-bit x86
pub const ARCH_386: &str = "386";
/// ARM soft-float (ARMv5)
pub const ARCH_ARMEL: &str = "armel";
/// ARM hard-float (ARMv6)
pub const ARCH_ARMHF: &str = "armhf";
/// 64-bit ARM
pub const ARCH_ARM64: &str = "arm64";

/// The selector that expands to every entry on an axis
pub const SELECT_ALL: &str = "all";

/// Prefix on an arch token that requests a statically linked build
pub const STATIC_PREFIX: &str = "static_";

/// One platform's row in the [`SupportTable`][]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformSupport {
    /// platform name
    pub name: String,
    /// architectures, in build order
    pub archs: Vec<String>,
    /// package formats, in build order
    pub formats: Vec<PackageFormat>,
}

/// Static mapping from platform to supported architectures and package formats
///
/// Order is significant: matrix expansion walks platforms and then architectures
/// in the order they were declared here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupportTable {
    platforms: Vec<PlatformSupport>,
}

impl SupportTable {
    /// Make a table from explicit rows
    pub fn new(platforms: Vec<PlatformSupport>) -> Self {
        Self { platforms }
    }

    /// The table of everything shipyard builds out of the box
    pub fn builtin() -> Self {
        use PackageFormat::*;
        let row = |name: &str, archs: &[&str], formats: &[PackageFormat]| PlatformSupport {
            name: name.to_owned(),
            archs: archs.iter().map(|a| a.to_string()).collect(),
            formats: formats.to_vec(),
        };
        Self::new(vec![
            row(
                PLATFORM_LINUX,
                &[ARCH_AMD64, ARCH_386, ARCH_ARMEL, ARCH_ARMHF, ARCH_ARM64],
                &[Deb, Rpm, Tar, Zip],
            ),
            row(PLATFORM_DARWIN, &[ARCH_AMD64, ARCH_ARM64], &[Tar, Zip]),
            row(PLATFORM_WINDOWS, &[ARCH_AMD64, ARCH_386], &[Zip]),
            row(PLATFORM_FREEBSD, &[ARCH_AMD64, ARCH_386], &[Tar]),
        ])
    }

    /// All rows, in declared order
    pub fn platforms(&self) -> &[PlatformSupport] {
        &self.platforms
    }

    /// Look up a platform's row
    pub fn platform(&self, name: &str) -> Option<&PlatformSupport> {
        self.platforms.iter().find(|p| p.name == name)
    }

    /// Comma-separated platform names, for error messages
    pub fn platform_names(&self) -> String {
        self.platforms
            .iter()
            .map(|p| p.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl PlatformSupport {
    /// Does this platform build the given (normalized) arch
    pub fn supports_arch(&self, arch: &str) -> bool {
        self.archs.iter().any(|a| a == arch)
    }

    /// Does this platform produce the given format
    pub fn supports_format(&self, format: PackageFormat) -> bool {
        self.formats.contains(&format)
    }
}

/// An arch token split into its normalized name and the static modifier
///
/// The original selector is never edited in place, this is derived from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchSelector {
    /// normalized arch name (or "all")
    pub arch: String,
    /// whether a `static_` prefix was present
    pub static_build: bool,
}

impl ArchSelector {
    /// Parse an arch token like `static_x86_64` into (`amd64`, static)
    pub fn parse(token: &str) -> Self {
        let token = token.trim().to_ascii_lowercase();
        let (static_build, rest) = match token.strip_prefix(STATIC_PREFIX) {
            Some(rest) => (true, rest),
            None => (false, token.as_str()),
        };
        Self {
            arch: normalize_arch(rest),
            static_build,
        }
    }

    /// Whether this selects every arch
    pub fn is_all(&self) -> bool {
        self.arch == SELECT_ALL
    }
}

/// Map the many spellings of an architecture onto the names in the support table
///
/// Unknown names are passed through untouched so validation can complain about them.
pub fn normalize_arch(arch: &str) -> String {
    let arch = arch.trim().to_ascii_lowercase();
    let normalized = match arch.as_str() {
        "x86_64" | "x64" | "amd64" => ARCH_AMD64,
        "i386" | "i686" | "x86" | "386" => ARCH_386,
        "arm" | "armhf" | "armv6" | "armv6l" | "armv7" | "armv7l" => ARCH_ARMHF,
        "armel" | "armv5" | "armv5l" => ARCH_ARMEL,
        "arm64" | "aarch64" | "armv8" => ARCH_ARM64,
        _ => return arch,
    };
    normalized.to_owned()
}

/// Map platform aliases onto the names in the support table
pub fn normalize_platform(platform: &str) -> String {
    let platform = platform.trim().to_ascii_lowercase();
    match platform.as_str() {
        "macos" | "osx" | "apple" => PLATFORM_DARWIN.to_owned(),
        "win" | "win32" => PLATFORM_WINDOWS.to_owned(),
        _ => platform,
    }
}

/// The platform shipyard itself is running on
pub fn host_platform() -> String {
    normalize_platform(std::env::consts::OS)
}

/// The architecture shipyard itself is running on
pub fn host_arch() -> String {
    normalize_arch(std::env::consts::ARCH)
}

/// The `GOARCH` value for a normalized arch
pub fn toolchain_arch(arch: &str) -> &str {
    match arch {
        ARCH_ARMEL | ARCH_ARMHF => "arm",
        other => other,
    }
}

/// The `GOARM` value for ARM variants
pub fn toolchain_arm_version(arch: &str) -> Option<&'static str> {
    match arch {
        ARCH_ARMEL => Some("5"),
        ARCH_ARMHF => Some("6"),
        ARCH_ARM64 => Some("7"),
        _ => None,
    }
}

/// The architecture name OS packages use for a normalized arch
pub fn package_arch(arch: &str) -> &str {
    match arch {
        ARCH_386 => "i386",
        other => other,
    }
}

/// File extension of executables on a platform
pub fn exe_suffix(platform: &str) -> &'static str {
    if platform == PLATFORM_WINDOWS {
        ".exe"
    } else {
        ""
    }
}
