use anyhow::{Context, Result, anyhow};
use std::io::Write;
use std::process::{Command, Stdio};

/// Hands a drafted email off to the platform mail client.
///
/// Ok means the compose window was handed off to the OS; that handoff is the
/// completion signal. Actual delivery is never observed, so implementations
/// never report per-message success beyond the launch itself.
pub trait MailComposer {
    fn compose(&self, recipient: &str, subject: &str, body: &str) -> Result<()>;
}

/// Opens the default mail client through the OS URL handler.
pub struct SystemMailer;

impl MailComposer for SystemMailer {
    fn compose(&self, recipient: &str, subject: &str, body: &str) -> Result<()> {
        open_url(&mailto_url(recipient, subject, body))
    }
}

pub fn mailto_url(recipient: &str, subject: &str, body: &str) -> String {
    format!(
        "mailto:{}?subject={}&body={}",
        recipient,
        urlencoding::encode(subject),
        urlencoding::encode(body)
    )
}

#[cfg(target_os = "macos")]
fn opener() -> (&'static str, &'static [&'static str]) {
    ("open", &[])
}

// rundll32 takes the URL as a real argument. `cmd /C start` would re-parse
// the command line and split the URL at the unquoted `&` between query
// parameters, dropping the body.
#[cfg(target_os = "windows")]
fn opener() -> (&'static str, &'static [&'static str]) {
    ("rundll32", &["url.dll,FileProtocolHandler"])
}

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
fn opener() -> (&'static str, &'static [&'static str]) {
    ("xdg-open", &[])
}

pub fn open_url(url: &str) -> Result<()> {
    let (program, args) = opener();
    Command::new(program)
        .args(args)
        .arg(url)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .with_context(|| format!("Failed to launch '{}' to open URL", program))?;
    Ok(())
}

#[cfg(target_os = "macos")]
const CLIPBOARD_COMMANDS: &[(&str, &[&str])] = &[("pbcopy", &[])];

#[cfg(target_os = "windows")]
const CLIPBOARD_COMMANDS: &[(&str, &[&str])] = &[("clip", &[])];

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
const CLIPBOARD_COMMANDS: &[(&str, &[&str])] = &[("wl-copy", &[]), ("xclip", &["-selection", "clipboard"])];

/// Copies text via the first clipboard tool found on this platform.
pub fn copy_to_clipboard(text: &str) -> Result<()> {
    for (program, args) in CLIPBOARD_COMMANDS {
        let child = Command::new(program)
            .args(*args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();

        let Ok(mut child) = child else { continue };

        if let Some(stdin) = child.stdin.as_mut() {
            stdin.write_all(text.as_bytes())?;
        }
        child.wait()?;
        return Ok(());
    }

    Err(anyhow!(
        "No clipboard tool found. Install wl-copy or xclip."
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mailto_url_encodes_subject_and_body() {
        let url = mailto_url(
            "ada@example.com",
            "Shortlisted for Backend Engineer",
            "Hi Ada,\n\nGood news!",
        );
        assert!(url.starts_with("mailto:ada@example.com?subject="));
        assert!(url.contains("Shortlisted%20for%20Backend%20Engineer"));
        assert!(url.contains("Hi%20Ada%2C%0A%0AGood%20news%21"));
        // The raw subject/body must not leak through unencoded.
        assert!(!url.contains("Hi Ada"));
    }

    #[test]
    fn test_mailto_url_empty_recipient() {
        let url = mailto_url("", "s", "b");
        assert!(url.starts_with("mailto:?subject="));
    }

    #[test]
    fn test_mailto_url_preserves_ampersands_encoded() {
        let url = mailto_url("a@x.com", "Q&A session", "come & see");
        assert!(url.contains("Q%26A"));
        assert!(url.contains("come%20%26%20see"));
    }

    // The subject/body separator is a literal `&`, which a shell-parsed
    // launcher would treat as a command separator.
    #[cfg(target_os = "windows")]
    #[test]
    fn test_windows_opener_bypasses_cmd_parsing() {
        let (program, args) = opener();
        assert_eq!(program, "rundll32");
        assert_eq!(args, &["url.dll,FileProtocolHandler"]);
    }
}
