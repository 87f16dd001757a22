//! NVIDIA hardware detection

use super::command;
use crate::error::Result;
use std::time::Duration;
use tracing::debug;

/// Whether `lspci -nnk` output lists an NVIDIA device
pub fn has_nvidia_device(lspci: &str) -> bool {
    lspci.to_lowercase().contains("nvidia")
}

/// Probe the PCI bus for NVIDIA hardware
pub async fn probe_nvidia(timeout: Duration) -> Result<bool> {
    let out = command::output("lspci", &["-nnk"], timeout).await?;
    let present = has_nvidia_device(&out);
    debug!("NVIDIA hardware present: {}", present);
    Ok(present)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detects_nvidia() {
        let lspci = "\
00:1e.0 3D controller [0302]: NVIDIA Corporation TU104GL [Tesla T4] [10de:1eb8] (rev a1)
\tSubsystem: NVIDIA Corporation TU104GL [Tesla T4] [10de:12a2]
";
        assert!(has_nvidia_device(lspci));
    }

    #[test]
    fn test_no_nvidia() {
        let lspci = "00:02.0 VGA compatible controller [0300]: Intel Corporation UHD Graphics 620 [8086:5917]\n";
        assert!(!has_nvidia_device(lspci));
        assert!(!has_nvidia_device(""));
    }
}
