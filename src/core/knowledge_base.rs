// src/core/knowledge_base.rs

//! Static, read-only reference data.
//!
//! Two tables live here. `FINDINGS` maps every finding type the classifiers can
//! emit to a remediation text, which the scanner attaches before
//! returning a report. `PLAYBOOKS` holds the canned methodology/tools/findings/
//! lessons records used as fallback content for CTF writeups, keyed by category tag.
//! The usage terms shown before scanning live here too.

use serde::Serialize;
use tracing::debug;

use crate::config::ScannerConfig;
use crate::core::models::{Finding, FindingKind};

/// Reference information for one finding type, optionally narrowed to one header.
pub struct FindingDetail {
    pub kind: FindingKind,
    /// When set, the entry only applies to findings about this header.
    pub header: Option<&'static str>,
    pub remediation: &'static str,
}

static FINDINGS: &[FindingDetail] = &[
    // --- Headers ---
    FindingDetail {
        kind: FindingKind::MissingSecurityHeader,
        header: Some("X-Frame-Options"),
        remediation: "Send 'X-Frame-Options: DENY' (or SAMEORIGIN) so the site cannot be framed for clickjacking.",
    },
    FindingDetail {
        kind: FindingKind::MissingSecurityHeader,
        header: Some("X-Content-Type-Options"),
        remediation: "Send 'X-Content-Type-Options: nosniff' to stop browsers from MIME-sniffing responses.",
    },
    FindingDetail {
        kind: FindingKind::MissingSecurityHeader,
        header: Some("Strict-Transport-Security"),
        remediation: "Send 'Strict-Transport-Security: max-age=31536000; includeSubDomains' on every HTTPS response.",
    },
    FindingDetail {
        kind: FindingKind::MissingSecurityHeader,
        header: Some("Content-Security-Policy"),
        remediation: "Define a Content-Security-Policy, starting from \"default-src 'self'\", and tighten it per resource type.",
    },
    FindingDetail {
        kind: FindingKind::MissingSecurityHeader,
        header: Some("X-XSS-Protection"),
        remediation: "Send 'X-XSS-Protection: 0' for modern browsers and rely on a Content-Security-Policy instead.",
    },
    FindingDetail {
        kind: FindingKind::MissingSecurityHeader,
        header: None,
        remediation: "Configure the web server or framework middleware to add the missing header to every response.",
    },
    FindingDetail {
        kind: FindingKind::CorsMisconfiguration,
        header: None,
        remediation: "Never combine a wildcard origin with credentials; echo back only origins from an explicit allow-list.",
    },
    // --- Cookies ---
    FindingDetail {
        kind: FindingKind::InsecureCookie,
        header: None,
        remediation: "Set the Secure attribute so the cookie is only sent over HTTPS.",
    },
    FindingDetail {
        kind: FindingKind::CookieWithoutHttpOnly,
        header: None,
        remediation: "Set the HttpOnly attribute on session and authentication cookies so scripts cannot read them.",
    },
    // --- Transport ---
    FindingDetail {
        kind: FindingKind::InsecureTransport,
        header: None,
        remediation: "Serve the site over HTTPS and redirect all plain HTTP requests to it.",
    },
    FindingDetail {
        kind: FindingKind::RedirectDowngrade,
        header: None,
        remediation: "Make every redirect target an https:// URL and enable HSTS to prevent downgrades.",
    },
    // --- TLS ---
    FindingDetail {
        kind: FindingKind::WeakTlsConfiguration,
        header: None,
        remediation: "Disable SSLv3/TLS 1.0/TLS 1.1, prefer TLS 1.3, and use a certificate from a trusted CA that is within its validity period.",
    },
    FindingDetail {
        kind: FindingKind::CertificateExpiring,
        header: None,
        remediation: "Renew the certificate and automate renewal (e.g. ACME) so it never approaches expiry.",
    },
    // --- Exposure ---
    FindingDetail {
        kind: FindingKind::ServerBannerDisclosure,
        header: None,
        remediation: "Remove or genericise Server and X-Powered-By headers so software versions are not advertised.",
    },
    FindingDetail {
        kind: FindingKind::DirectoryListing,
        header: None,
        remediation: "Disable automatic directory indexes (autoindex off / Options -Indexes) and serve an index page.",
    },
    FindingDetail {
        kind: FindingKind::OpenPort,
        header: None,
        remediation: "Close the port or restrict it with a firewall unless the service must be reachable publicly.",
    },
    // --- API ---
    FindingDetail {
        kind: FindingKind::ExcessiveMethods,
        header: None,
        remediation: "Only allow the HTTP methods each route needs; disable TRACE entirely.",
    },
    FindingDetail {
        kind: FindingKind::ServerErrorResponse,
        header: None,
        remediation: "Handle errors explicitly and return generic messages without stack traces or internals.",
    },
    FindingDetail {
        kind: FindingKind::MissingContentType,
        header: None,
        remediation: "Always set an explicit Content-Type (with charset) on successful responses.",
    },
    // --- Content ---
    FindingDetail {
        kind: FindingKind::PhishingIndicator,
        header: None,
        remediation: "Do not follow links or enter credentials; verify the sender through a known channel and report the message.",
    },
];

/// Looks up the detail for a finding type label, preferring the entry for `header`.
///
/// # Arguments
///
/// * `kind` - The finding type label, as found in `Finding::kind`.
/// * `header` - The header the finding is about, if any.
///
/// # Returns
///
/// The most specific matching `FindingDetail`, or `None` for types the table does not know.
pub fn get_finding_detail(kind: &str, header: Option<&str>) -> Option<&'static FindingDetail> {
    let matches_kind = |detail: &&FindingDetail| {
        let label: &'static str = detail.kind.into();
        label == kind
    };
    FINDINGS
        .iter()
        .filter(matches_kind)
        .find(|d| d.header.is_some() && d.header == header)
        .or_else(|| FINDINGS.iter().filter(matches_kind).find(|d| d.header.is_none()))
}

/// Attaches remediation text to every finding that does not carry one yet.
pub fn annotate(findings: Vec<Finding>) -> Vec<Finding> {
    findings
        .into_iter()
        .map(|finding| {
            if finding.remediation.is_some() {
                return finding;
            }
            match get_finding_detail(&finding.kind, finding.header.as_deref()) {
                Some(detail) => finding.with_remediation(detail.remediation),
                None => {
                    debug!(kind = %finding.kind, "No remediation on file.");
                    finding
                }
            }
        })
        .collect()
}

// --- Usage terms ---

const DISCLAIMER_TERMS: [&str; 4] = [
    "Only scan targets you own or have explicit permission to test",
    "Unauthorized scanning may be illegal in your jurisdiction",
    "This tool is for educational purposes only",
    "Results are basic and may contain false positives/negatives",
];

/// Usage terms every caller should read before scanning.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Disclaimer {
    pub message: String,
    pub terms: Vec<String>,
}

/// The scanner's usage terms, with the authenticated rate limit taken from `config`.
pub fn scanner_disclaimer(config: &ScannerConfig) -> Disclaimer {
    let mut terms: Vec<String> = DISCLAIMER_TERMS.iter().map(|t| t.to_string()).collect();
    terms.insert(
        3,
        format!(
            "Rate limits apply: {} scans per user every {} minutes",
            config.user_scan_limit,
            config.user_window().as_secs() / 60
        ),
    );
    Disclaimer {
        message: "Security Scanner Disclaimer".to_string(),
        terms,
    }
}

// --- Writeup playbooks ---

/// Canned writeup content for one challenge category. `{difficulty}` and
/// `{category}` placeholders are filled in by [`playbook_for`].
pub struct Playbook {
    pub tag: &'static str,
    pub methodology: &'static [&'static str],
    pub tools: &'static [&'static str],
    pub findings: &'static [&'static str],
    pub lessons: &'static [&'static str],
}

pub static PLAYBOOKS: &[Playbook] = &[
    Playbook {
        tag: "linux",
        methodology: &[
            "Perform comprehensive port scanning using nmap to identify open services",
            "Enumerate services and extract useful information from discovered ports",
            "Identify and exploit vulnerabilities in discovered services",
            "Gain initial access and establish foothold on the system",
            "Escalate privileges using discovered misconfigurations or exploits",
            "Access sensitive files and capture flags",
            "Document findings and exploitation techniques used",
        ],
        tools: &[
            "nmap", "netcat", "python", "bash scripting", "SSH", "privilege escalation tools", "LinPEAS",
            "grep/awk", "Burp Suite", "Metasploit", "Wireshark", "curl",
        ],
        findings: &[
            "{difficulty} difficulty challenge requiring solid understanding of Linux systems",
            "Multiple exploitation paths available for privilege escalation",
            "Vulnerable SUID binaries found allowing privilege escalation",
            "Misconfigured permissions on critical system files",
            "Default or weak credentials present in the system",
            "Insufficient access controls allowing unauthorized data access",
        ],
        lessons: &[
            "Importance of thorough enumeration and reconnaissance",
            "Always check for SUID binaries and file permissions",
            "Weak credential management poses significant security risks",
            "System hardening and regular patching is critical",
            "Principle of least privilege should be applied to all processes",
            "Documentation of exploitation steps aids in reproducibility",
            "{difficulty} challenges require attention to detail and persistence",
        ],
    },
    Playbook {
        tag: "web",
        methodology: &[
            "Perform reconnaissance and gather target information",
            "Map application functionality and identify entry points",
            "Test for common web vulnerabilities (OWASP Top 10)",
            "Exploit identified vulnerabilities to gain access",
            "Extract sensitive data and credentials",
            "Escalate privileges if possible within the application",
            "Document and report findings with proof of concept",
        ],
        tools: &[
            "Burp Suite", "OWASP ZAP", "SQLmap", "curl", "browser DevTools", "nmap", "nikto", "gobuster",
            "ffuf", "Metasploit", "Wireshark", "wfuzz",
        ],
        findings: &[
            "{difficulty} difficulty web application challenge",
            "SQL injection vulnerability in user input fields",
            "Cross-Site Scripting (XSS) vulnerabilities present",
            "Insufficient input validation and sanitization",
            "Weak session management and authentication mechanisms",
            "Sensitive data exposure through improper access controls",
        ],
        lessons: &[
            "Always sanitize and validate user inputs server-side",
            "Implement proper authentication and session management",
            "Use parameterized queries to prevent SQL injection",
            "Content Security Policy (CSP) helps mitigate XSS attacks",
            "Regular security testing identifies vulnerabilities early",
            "Follow OWASP guidelines for secure web development",
            "{difficulty} web challenges require understanding of application logic",
        ],
    },
    Playbook {
        tag: "windows",
        methodology: &[
            "Scan and enumerate Windows services and open ports",
            "Identify vulnerable services and misconfigurations",
            "Exploit vulnerabilities to gain initial access",
            "Perform privilege escalation enumeration",
            "Execute privilege escalation exploit techniques",
            "Establish persistence and access system resources",
            "Extract sensitive information and capture flags",
        ],
        tools: &[
            "nmap", "Metasploit", "mimikatz", "PowerShell", "Impacket", "WinPEAS", "Windows Exploit Suggester",
            "Evil-WinRM", "Burp Suite", "Wireshark", "Responder", "BloodHound",
        ],
        findings: &[
            "{difficulty} difficulty Windows system challenge",
            "Unpatched Windows service with known exploits",
            "Clear-text credentials stored in configuration files",
            "Weak service permissions allowing privilege escalation",
            "Misconfigured registry settings exposing vulnerabilities",
            "Default Windows configurations exploitable for lateral movement",
        ],
        lessons: &[
            "Keep Windows systems patched and up to date",
            "Never store credentials in plain text",
            "Implement proper service permission configurations",
            "Regular auditing of Windows security settings is essential",
            "Defense in depth principles apply to Windows environments",
            "Understanding Windows internals aids in exploitation",
            "{difficulty} Windows challenges require OS-specific knowledge",
        ],
    },
];

static GENERIC_PLAYBOOK: Playbook = Playbook {
    tag: "generic",
    methodology: &[
        "Reconnaissance and information gathering phase",
        "Vulnerability identification and analysis",
        "Exploitation and initial access",
        "Privilege escalation techniques",
        "Post-exploitation and data extraction",
        "Documentation of attack path and findings",
    ],
    tools: &[
        "Nmap", "Burp Suite", "Metasploit", "Wireshark", "netcat", "python", "bash scripting", "curl", "gobuster",
        "nikto", "SQLmap", "john",
    ],
    findings: &[
        "{difficulty} difficulty challenge in {category}",
        "Multiple exploitation vectors identified",
        "Security misconfigurations present",
        "Insufficient access controls",
        "Vulnerable software versions in use",
    ],
    lessons: &[
        "Thorough reconnaissance is critical for success",
        "Understanding the fundamentals is key",
        "Security best practices prevent common vulnerabilities",
        "Regular updates and patching are essential",
        "Documentation helps in learning and reporting",
        "{difficulty} level requires persistence and methodology",
    ],
};

/// Writeup content produced from a playbook.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct WriteupContent {
    pub category_tag: String,
    pub methodology: Vec<String>,
    pub tools_used: Vec<String>,
    pub key_findings: Vec<String>,
    pub lessons_learned: Vec<String>,
}

/// Picks the playbook whose tag occurs in `category` (case-insensitive), or the
/// generic one, and fills in the placeholders.
pub fn playbook_for(category: &str, difficulty: &str) -> WriteupContent {
    let lowered = category.to_lowercase();
    let playbook = PLAYBOOKS
        .iter()
        .find(|p| lowered.contains(p.tag))
        .unwrap_or(&GENERIC_PLAYBOOK);
    debug!(category, tag = playbook.tag, "Playbook selected.");

    let fill = |lines: &[&str]| -> Vec<String> {
        lines
            .iter()
            .map(|l| l.replace("{difficulty}", difficulty).replace("{category}", category))
            .collect()
    };
    WriteupContent {
        category_tag: playbook.tag.to_string(),
        methodology: fill(playbook.methodology),
        tools_used: fill(playbook.tools),
        key_findings: fill(playbook.findings),
        lessons_learned: fill(playbook.lessons),
    }
}
