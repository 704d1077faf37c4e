//! Architecture detection.

/// CPU architecture types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arch {
    X86,
    X64,
    Arm,
    Arm64,
    Unknown,
}

impl Arch {
    /// Release-asset naming of the architecture, lower-case.
    pub fn as_str(self) -> &'static str {
        match self {
            Arch::X86 => "x86",
            Arch::X64 => "x64",
            Arch::Arm => "arm",
            Arch::Arm64 => "arm64",
            Arch::Unknown => "unknown",
        }
    }
}

/// Maps a raw CPU architecture name as reported by the OS.
pub fn from_cpu_arch(raw: &str) -> Arch {
    match raw.trim().to_lowercase().as_str() {
        "i386" | "i586" | "i686" | "x86" => Arch::X86,
        "x86_64" | "amd64" | "x64" => Arch::X64,
        "arm" | "armv7l" | "armv7" => Arch::Arm,
        "aarch64" | "arm64" => Arch::Arm64,
        _ => Arch::Unknown,
    }
}

/// Detect current architecture.
pub fn detect() -> Arch {
    match from_cpu_arch(&sysinfo::System::cpu_arch()) {
        Arch::Unknown => from_cpu_arch(std::env::consts::ARCH),
        arch => arch,
    }
}

/// The current architecture as used in asset names (`x64`, `arm64`, ...).
pub fn current() -> String {
    detect().as_str().to_string()
}
