//! Turning a newsletter into a PDF.
//!
//! The message is wrapped in a standalone HTML document styled for an e-ink screen, and an
//! external converter (by default `weasyprint`) turns that document into a PDF.

use std::fs::{self, File};
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::Duration;

use tracing::debug;
use wait_timeout::ChildExt;

use crate::collaborators::Renderer;
use crate::error::RenderError;
use crate::types::MessageRef;
use crate::utils::escape_html;

const EINK_CSS: &str = "
@page { size: A4; margin: 1cm; }
body {
    font-family: 'Georgia', 'Times New Roman', serif;
    font-size: 12pt;
    line-height: 1.6;
    color: #000000;
    max-width: 800px;
    margin: 0 auto;
}
h1, h2, h3, h4, h5, h6 {
    font-family: 'Arial', 'Helvetica', sans-serif;
    font-weight: bold;
    margin-top: 1em;
    margin-bottom: 0.5em;
}
h1 { font-size: 18pt; }
h2 { font-size: 16pt; }
h3 { font-size: 14pt; }
p { margin-bottom: 1em; text-align: justify; }
a { color: #000000; text-decoration: underline; }
img { max-width: 100%; height: auto; display: block; margin: 1em 0; }
blockquote {
    border-left: 3px solid #000000;
    padding-left: 1em;
    margin-left: 0;
    font-style: italic;
}
pre, code {
    font-family: 'Courier New', monospace;
    background-color: #f0f0f0;
    padding: 0.2em 0.4em;
    font-size: 10pt;
}
pre { padding: 1em; overflow-x: auto; }
table { border-collapse: collapse; width: 100%; margin: 1em 0; }
th, td { border: 1px solid #000000; padding: 0.5em; text-align: left; }
th { background-color: #e0e0e0; font-weight: bold; }
.newsletter-header { border-bottom: 2px solid #000000; padding-bottom: 0.5em; margin-bottom: 1em; }
.newsletter-title { font-size: 20pt; font-weight: bold; margin-bottom: 0.2em; }
.newsletter-meta { font-size: 10pt; color: #666666; font-style: italic; }
";

/// Build the standalone HTML document for a message.
///
/// An HTML body is embedded as is. A plain text body is escaped and split into paragraphs on
/// blank lines.
pub fn newsletter_html(message: &MessageRef) -> String {
    let subject = escape_html(&message.subject);
    let content = match message.body.html.as_deref().filter(|h| !h.trim().is_empty()) {
        Some(html) => html.to_string(),
        None => text_paragraphs(message.body.text.as_deref().unwrap_or_default()),
    };
    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>{subject}</title>\n\
         <style>{css}</style>\n</head>\n<body>\n\
         <div class=\"newsletter-header\">\n\
         <div class=\"newsletter-title\">{subject}</div>\n\
         <div class=\"newsletter-meta\">From: {sender}<br/>Date: {date}</div>\n\
         </div>\n{content}\n</body>\n</html>\n",
        css = EINK_CSS,
        sender = escape_html(message.sender_display()),
        date = message.received_at.format("%B %d, %Y"),
    )
}

fn text_paragraphs(text: &str) -> String {
    text.replace("\r\n", "\n")
        .split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| format!("<p>{}</p>", escape_html(p)))
        .collect()
}

/// Renders through an external HTML to PDF converter.
///
/// The command line is split on whitespace; the arguments `{input}` and `{output}` are replaced
/// by the paths of the HTML document and of the PDF to produce. No shell is involved.
#[derive(Clone, Debug)]
pub struct CommandRenderer {
    command: Vec<String>,
    timeout: Duration,
}

impl CommandRenderer {
    pub fn new(command: &str, timeout: Duration) -> Self {
        CommandRenderer {
            command: command.split_whitespace().map(str::to_string).collect(),
            timeout,
        }
    }

    fn command_line(&self) -> String {
        self.command.join(" ")
    }

    fn spawn(&self, input: &Path, output: &Path, stderr: File) -> Result<Child, RenderError> {
        let (program, args) = self.command.split_first().ok_or_else(|| RenderError::Spawn {
            command: String::new(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty command"),
        })?;
        let mut cmd = Command::new(program);
        for arg in args {
            match arg.as_str() {
                "{input}" => cmd.arg(input),
                "{output}" => cmd.arg(output),
                other => cmd.arg(other),
            };
        }
        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::from(stderr))
            .spawn()
            .map_err(|source| RenderError::Spawn {
                command: self.command_line(),
                source,
            })
    }

    /// Wait for `child`, killing it once the timeout has passed.
    fn wait(&self, child: &mut Child) -> Result<ExitStatus, RenderError> {
        if let Some(status) = child.wait_timeout(self.timeout)? {
            return Ok(status);
        }
        // the child may have exited in between; either way it is gone afterwards
        let _ = child.kill();
        let _ = child.wait();
        Err(RenderError::Timeout {
            command: self.command_line(),
            timeout: self.timeout,
        })
    }
}

impl Renderer for CommandRenderer {
    fn render(&self, message: &MessageRef) -> Result<Vec<u8>, RenderError> {
        let dir = tempfile::tempdir()?;
        let input = dir.path().join("newsletter.html");
        let output = dir.path().join("newsletter.pdf");
        let stderr_path = dir.path().join("stderr.log");
        fs::write(&input, newsletter_html(message))?;

        let mut child = self.spawn(&input, &output, File::create(&stderr_path)?)?;
        let status = self.wait(&mut child)?;
        if !status.success() {
            let stderr = fs::read_to_string(&stderr_path).unwrap_or_default();
            return Err(RenderError::Failed {
                command: self.command_line(),
                status: status.to_string(),
                stderr: stderr.trim().to_string(),
            });
        }

        let pdf = match fs::read(&output) {
            Ok(pdf) => pdf,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(RenderError::Empty),
            Err(e) => return Err(e.into()),
        };
        if pdf.is_empty() {
            return Err(RenderError::Empty);
        }
        debug!(subject = %message.subject, bytes = pdf.len(), "rendered newsletter");
        Ok(pdf)
    }
}
