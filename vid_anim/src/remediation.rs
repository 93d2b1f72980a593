//! Distro-specific guidance for hosts whose ffmpeg cannot decode the input.

use std::fs;
use std::path::Path;

/// Where os-release lives; the second path is the freedesktop fallback.
pub const OS_RELEASE_PATHS: &[&str] = &["/etc/os-release", "/usr/lib/os-release"];

/// `ID` and `ID_LIKE` from os-release, lowercased. Empty when unknown.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DistroInfo {
    pub id: String,
    pub id_like: String,
}

impl DistroInfo {
    /// Best effort: unreadable or missing files give an empty (generic) result.
    pub fn detect() -> Self {
        OS_RELEASE_PATHS
            .iter()
            .map(Path::new)
            .find(|p| p.is_file())
            .map(Self::from_path)
            .unwrap_or_default()
    }

    pub fn from_path(path: &Path) -> Self {
        match fs::read(path) {
            Ok(bytes) => Self::parse(&String::from_utf8_lossy(&bytes)),
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "os-release not readable");
                Self::default()
            }
        }
    }

    pub fn parse(text: &str) -> Self {
        let mut info = Self::default();
        for line in text.lines() {
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let value = value
                .trim()
                .trim_matches(|c| c == '"' || c == '\'')
                .to_lowercase();
            match key.trim() {
                "ID" => info.id = value,
                "ID_LIKE" => info.id_like = value,
                _ => {}
            }
        }
        info
    }

    fn like_contains(&self, needle: &str) -> bool {
        self.id_like.contains(needle)
    }

    pub fn family(&self) -> DistroFamily {
        let id = self.id.as_str();
        if id == "fedora" || self.like_contains("fedora") {
            DistroFamily::Fedora
        } else if matches!(id, "ubuntu" | "debian")
            || self.like_contains("debian")
            || self.like_contains("ubuntu")
        {
            DistroFamily::Debian
        } else if matches!(id, "arch" | "manjaro") || self.like_contains("arch") {
            DistroFamily::Arch
        } else if matches!(id, "opensuse-tumbleweed" | "opensuse-leap" | "opensuse")
            || self.like_contains("suse")
        {
            DistroFamily::Suse
        } else {
            DistroFamily::Generic
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistroFamily {
    Fedora,
    Debian,
    Arch,
    Suse,
    Generic,
}

impl DistroFamily {
    fn steps(&self) -> &'static [&'static str] {
        match self {
            DistroFamily::Fedora => &[
                "Enable RPM Fusion (free + nonfree):",
                "sudo dnf install https://download1.rpmfusion.org/free/fedora/rpmfusion-free-release-$(rpm -E %fedora).noarch.rpm https://download1.rpmfusion.org/nonfree/fedora/rpmfusion-nonfree-release-$(rpm -E %fedora).noarch.rpm",
                "Replace ffmpeg-free with full ffmpeg:",
                "sudo dnf swap ffmpeg-free ffmpeg --allowerasing",
                "Then install libraries:",
                "sudo dnf install ffmpeg ffmpeg-libs",
                "Optional multimedia refresh (avoid weak deps):",
                "sudo dnf update @multimedia --setopt=install_weak_deps=False --exclude=PackageKit-gstreamer-plugin",
            ],
            DistroFamily::Debian => &[
                "sudo apt update",
                "sudo apt install ffmpeg",
                "On Ubuntu, if needed: sudo apt install libavcodec-extra",
            ],
            DistroFamily::Arch => &["sudo pacman -Syu ffmpeg"],
            DistroFamily::Suse => &[
                "Enable Packman repo and install full ffmpeg (commands vary by version):",
                "sudo zypper ar -cfp 90 https://ftp.gwdg.de/pub/linux/misc/packman/suse/openSUSE_Tumbleweed/ packman",
                "sudo zypper dup --from packman --allow-vendor-change",
                "sudo zypper in ffmpeg",
            ],
            DistroFamily::Generic => &[
                "Install a full-featured ffmpeg from your distribution or a trusted multimedia repo.",
                "Ensure software decoders for H.264 (h264) and HEVC (hevc) are present in `ffmpeg -decoders`.",
            ],
        }
    }
}

/// Installation guidance for `codec` on the given host. Never fails.
pub fn remediation_message(codec: &str, distro: &DistroInfo) -> String {
    let mut lines = vec![
        format!(
            "It looks like your ffmpeg cannot decode {} on this system.",
            codec.to_uppercase()
        ),
        "\nRecommended fix:".to_string(),
    ];
    lines.extend(distro.family().steps().iter().map(|s| format!("  - {}", s)));
    lines.push("\nAfter installing, restart vid-anim and try again.".to_string());
    lines.join("\n")
}
