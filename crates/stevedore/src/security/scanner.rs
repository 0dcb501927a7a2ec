//! Signature-based content scanning
//!
//! A heuristic floor, not an antivirus engine: a bounded prefix of the
//! upload is decoded as text and matched against known malicious-content
//! markers.

use serde::Serialize;

/// Bytes of the payload inspected by the scanner.
const SCAN_PREFIX_LEN: usize = 8 * 1024;

/// Marker substring (lowercase) paired with the threat name it reports.
const SIGNATURES: &[(&str, &str)] = &[
    (
        "x5o!p%@ap[4\\pzx54(p^)7cc)7}$eicar-standard-antivirus-test-file!$h+h*",
        "EICAR-Test-File",
    ),
    ("<script", "Script-Injection"),
    ("javascript:", "Script-Injection"),
    ("vbscript:", "Script-Injection"),
    ("powershell -enc", "Encoded-PowerShell"),
    ("cmd.exe /c", "Shell-Execution"),
    ("eval(base64_decode", "Obfuscated-Eval"),
];

/// Outcome of one scan.
#[derive(Debug, Clone, Serialize)]
pub struct ScanResult {
    pub is_clean: bool,
    pub threat: Option<String>,
}

impl ScanResult {
    fn clean() -> Self {
        Self {
            is_clean: true,
            threat: None,
        }
    }

    fn infected(threat: &str) -> Self {
        Self {
            is_clean: false,
            threat: Some(threat.to_string()),
        }
    }
}

/// Scans upload content against the signature table.
#[derive(Debug, Clone)]
pub struct ContentScanner {
    max_scan_bytes: usize,
}

impl Default for ContentScanner {
    fn default() -> Self {
        Self {
            max_scan_bytes: SCAN_PREFIX_LEN,
        }
    }
}

impl ContentScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Match the content prefix against the signature table.
    ///
    /// Operates on a borrowed slice, so the caller's buffer is left
    /// untouched and fully consumable afterwards.
    pub fn scan(&self, content: &[u8], file_name: &str) -> ScanResult {
        let prefix_len = content.len().min(self.max_scan_bytes);
        let text = String::from_utf8_lossy(&content[..prefix_len]).to_lowercase();

        for (marker, threat) in SIGNATURES {
            if text.contains(marker) {
                tracing::warn!(file_name, threat, "content scan matched signature");
                return ScanResult::infected(threat);
            }
        }
        ScanResult::clean()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EICAR: &[u8] =
        br"X5O!P%@AP[4\PZX54(P^)7CC)7}$EICAR-STANDARD-ANTIVIRUS-TEST-FILE!$H+H*";

    #[test]
    fn test_clean_content_passes() {
        let scanner = ContentScanner::new();
        let result = scanner.scan(b"{\"version\": \"1.0.0\"}", "package.json");
        assert!(result.is_clean);
        assert!(result.threat.is_none());
    }

    #[test]
    fn test_eicar_is_detected() {
        let scanner = ContentScanner::new();
        let result = scanner.scan(EICAR, "sample.txt");
        assert!(!result.is_clean);
        assert_eq!(result.threat.as_deref(), Some("EICAR-Test-File"));
    }

    #[test]
    fn test_script_injection_detected_case_insensitively() {
        let scanner = ContentScanner::new();
        let result = scanner.scan(b"<SCRIPT>alert(1)</SCRIPT>", "page.html");
        assert!(!result.is_clean);
        assert_eq!(result.threat.as_deref(), Some("Script-Injection"));
    }

    #[test]
    fn test_signature_beyond_prefix_is_not_scanned() {
        let scanner = ContentScanner::new();
        let mut content = vec![b'a'; SCAN_PREFIX_LEN];
        content.extend_from_slice(b"<script>");
        let result = scanner.scan(&content, "big.txt");
        assert!(result.is_clean);
    }

    #[test]
    fn test_binary_content_does_not_panic() {
        let scanner = ContentScanner::new();
        let content: Vec<u8> = (0..=255).cycle().take(4096).collect();
        let result = scanner.scan(&content, "blob.bin");
        assert!(result.is_clean);
    }
}
