//! Removal of trusted-configuration blocks from model-supplied Terraform
//!
//! The scanner walks the text once, tracking statement boundaries, and skips
//! quoted strings (including `${...}` templates), comments and heredocs so braces
//! inside them never affect block matching. Any block whose type is one of the
//! trusted kinds is removed together with everything nested inside it, at any depth.

use tracing::warn;

/// Result of sanitizing a configuration body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sanitized {
    /// The body with every trusted block removed
    pub body: String,
    /// Headers of the removed blocks, e.g. `provider "aws"`
    pub removed: Vec<String>,
}

impl Sanitized {
    pub fn was_modified(&self) -> bool {
        !self.removed.is_empty()
    }
}

/// Strips blocks of the configured kinds from untrusted text
#[derive(Debug, Clone)]
pub struct Sanitizer {
    kinds: Vec<String>,
}

impl Default for Sanitizer {
    fn default() -> Self {
        Self::new(["provider", "terraform"])
    }
}

impl Sanitizer {
    pub fn new<I, S>(kinds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            kinds: kinds.into_iter().map(Into::into).collect(),
        }
    }

    pub fn kinds(&self) -> &[String] {
        &self.kinds
    }

    /// Remove every block of a trusted kind from `code`
    pub fn sanitize(&self, code: &str) -> Sanitized {
        let bytes = code.as_bytes();
        let mut spans: Vec<(usize, usize)> = Vec::new();
        let mut removed = Vec::new();
        let mut i = 0;
        let mut at_statement_start = true;

        while i < bytes.len() {
            let c = bytes[i];

            if at_statement_start && is_ident_start(c) {
                let ident_end = scan_ident(bytes, i);
                let ident = &code[i..ident_end];

                if self.kinds.iter().any(|k| k == ident) {
                    if let Some(open) = scan_block_header(bytes, ident_end) {
                        let close = match_brace(bytes, open);
                        let header = collapse_whitespace(&code[i..open]);
                        warn!(block = %header, "Removing untrusted configuration block");
                        removed.push(header);

                        let start = removal_start(bytes, i);
                        let end = removal_end(bytes, close);
                        spans.push((start, end));
                        i = end;
                        at_statement_start = true;
                        continue;
                    }
                }

                i = ident_end;
                at_statement_start = false;
                continue;
            }

            match c {
                b'"' => {
                    i = skip_string(bytes, i);
                    at_statement_start = false;
                }
                b'#' => i = skip_line_comment(bytes, i),
                b'/' if bytes.get(i + 1) == Some(&b'/') => i = skip_line_comment(bytes, i),
                b'/' if bytes.get(i + 1) == Some(&b'*') => i = skip_block_comment(bytes, i),
                b'<' if is_heredoc_start(bytes, i) => {
                    i = skip_heredoc(bytes, i);
                    at_statement_start = true;
                }
                b'\n' | b'{' | b'}' => {
                    i += 1;
                    at_statement_start = true;
                }
                b' ' | b'\t' | b'\r' => i += 1,
                _ => {
                    i += 1;
                    at_statement_start = false;
                }
            }
        }

        if spans.is_empty() {
            return Sanitized {
                body: code.to_string(),
                removed,
            };
        }

        let mut body = String::with_capacity(code.len());
        let mut cursor = 0;
        for (start, end) in spans {
            body.push_str(&code[cursor..start]);
            cursor = end;
        }
        body.push_str(&code[cursor..]);

        Sanitized { body, removed }
    }
}

fn is_ident_start(c: u8) -> bool {
    c.is_ascii_alphabetic() || c == b'_'
}

fn is_ident_char(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'_' || c == b'-'
}

fn scan_ident(bytes: &[u8], start: usize) -> usize {
    let mut i = start;
    while i < bytes.len() && is_ident_char(bytes[i]) {
        i += 1;
    }
    i
}

/// After a block type identifier, consume labels and return the index of `{`.
///
/// Returns `None` when the identifier is not followed by a block body, for
/// example an attribute such as `provider = aws.west`.
fn scan_block_header(bytes: &[u8], mut i: usize) -> Option<usize> {
    loop {
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        match *bytes.get(i)? {
            b'{' => return Some(i),
            b'"' => i = skip_string(bytes, i),
            c if is_ident_start(c) => i = scan_ident(bytes, i),
            _ => return None,
        }
    }
}

/// Index of the `}` matching the `{` at `open`, or `bytes.len()` when unbalanced.
fn match_brace(bytes: &[u8], open: usize) -> usize {
    let mut depth = 0usize;
    let mut i = open;

    while i < bytes.len() {
        match bytes[i] {
            b'{' => {
                depth += 1;
                i += 1;
            }
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return i;
                }
                i += 1;
            }
            b'"' => i = skip_string(bytes, i),
            b'#' => i = skip_line_comment(bytes, i),
            b'/' if bytes.get(i + 1) == Some(&b'/') => i = skip_line_comment(bytes, i),
            b'/' if bytes.get(i + 1) == Some(&b'*') => i = skip_block_comment(bytes, i),
            b'<' if is_heredoc_start(bytes, i) => i = skip_heredoc(bytes, i),
            _ => i += 1,
        }
    }

    bytes.len()
}

/// Skip a quoted string starting at `start`; returns the index after the closing quote.
fn skip_string(bytes: &[u8], start: usize) -> usize {
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'"' => return i + 1,
            // `$${` and `%%{` are escapes for literal `${` and `%{`
            b'$' | b'%' if is_escaped_opener(bytes, i) => i += 3,
            b'$' | b'%' if bytes.get(i + 1) == Some(&b'{') => i = skip_template(bytes, i + 1),
            b'\n' => return i,
            _ => i += 1,
        }
    }
    bytes.len()
}

fn is_escaped_opener(bytes: &[u8], i: usize) -> bool {
    bytes.get(i + 1) == Some(&bytes[i]) && bytes.get(i + 2) == Some(&b'{')
}

/// Skip a `${ ... }` template expression whose `{` is at `open`.
fn skip_template(bytes: &[u8], open: usize) -> usize {
    let mut depth = 0usize;
    let mut i = open;
    while i < bytes.len() {
        match bytes[i] {
            b'{' => {
                depth += 1;
                i += 1;
            }
            b'}' => {
                depth -= 1;
                i += 1;
                if depth == 0 {
                    return i;
                }
            }
            b'"' => i = skip_string(bytes, i),
            _ => i += 1,
        }
    }
    bytes.len()
}

fn skip_line_comment(bytes: &[u8], start: usize) -> usize {
    let mut i = start;
    while i < bytes.len() && bytes[i] != b'\n' {
        i += 1;
    }
    i
}

fn skip_block_comment(bytes: &[u8], start: usize) -> usize {
    let mut i = start + 2;
    while i + 1 < bytes.len() {
        if bytes[i] == b'*' && bytes[i + 1] == b'/' {
            return i + 2;
        }
        i += 1;
    }
    bytes.len()
}

fn is_heredoc_start(bytes: &[u8], i: usize) -> bool {
    if bytes.get(i + 1) != Some(&b'<') {
        return false;
    }
    let mut j = i + 2;
    if bytes.get(j) == Some(&b'-') {
        j += 1;
    }
    bytes.get(j).map_or(false, |c| is_ident_start(*c))
}

/// Skip a heredoc (`<<EOF` or `<<-EOF`) through the end of its terminator line.
fn skip_heredoc(bytes: &[u8], start: usize) -> usize {
    let mut i = start + 2;
    if bytes.get(i) == Some(&b'-') {
        i += 1;
    }
    let marker_start = i;
    let marker_end = scan_ident(bytes, i);
    let marker = &bytes[marker_start..marker_end];

    let mut line_start = match bytes[marker_end..].iter().position(|&c| c == b'\n') {
        Some(off) => marker_end + off + 1,
        None => return bytes.len(),
    };

    while line_start < bytes.len() {
        let line_end = bytes[line_start..]
            .iter()
            .position(|&c| c == b'\n')
            .map_or(bytes.len(), |off| line_start + off);
        let line = trim_ascii(&bytes[line_start..line_end]);
        if line == marker {
            return line_end;
        }
        line_start = line_end + 1;
    }

    bytes.len()
}

fn trim_ascii(mut s: &[u8]) -> &[u8] {
    while let [first, rest @ ..] = s {
        if first.is_ascii_whitespace() {
            s = rest;
        } else {
            break;
        }
    }
    while let [rest @ .., last] = s {
        if last.is_ascii_whitespace() {
            s = rest;
        } else {
            break;
        }
    }
    s
}

/// Widen the removal start over indentation when the block begins its own line.
fn removal_start(bytes: &[u8], header_start: usize) -> usize {
    let mut i = header_start;
    while i > 0 && matches!(bytes[i - 1], b' ' | b'\t') {
        i -= 1;
    }
    if i == 0 || bytes[i - 1] == b'\n' {
        i
    } else {
        header_start
    }
}

/// Consume the closing brace plus trailing blanks and a single line break.
fn removal_end(bytes: &[u8], close: usize) -> usize {
    if close >= bytes.len() {
        return bytes.len();
    }
    let mut i = close + 1;
    while i < bytes.len() && matches!(bytes[i], b' ' | b'\t' | b'\r') {
        i += 1;
    }
    if i < bytes.len() && bytes[i] == b'\n' {
        i += 1;
    }
    i
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sanitize(code: &str) -> Sanitized {
        Sanitizer::default().sanitize(code)
    }

    #[test]
    fn test_clean_input_is_untouched() {
        let code = r#"resource "aws_s3_bucket" "logs" {
  bucket = "logs"
  tags = {
    Name = "logs"
  }
}
"#;
        let result = sanitize(code);
        assert_eq!(result.body, code);
        assert!(!result.was_modified());
    }

    #[test]
    fn test_sanitize_is_idempotent() {
        let code = r#"provider "aws" {
  region = "eu-west-1"
}

resource "aws_s3_bucket" "logs" {
  bucket = "logs"
}
"#;
        let once = sanitize(code);
        let twice = sanitize(&once.body);
        assert_eq!(once.body, twice.body);
        assert!(!twice.was_modified());
    }

    #[test]
    fn test_removes_provider_with_nested_blocks() {
        let code = r#"provider "aws" {
  region = "eu-west-1"
  assume_role {
    role_arn = "arn:aws:iam::123:role/evil"
    tags = {
      a = "b"
    }
  }
  default_tags {
    tags = { Owner = "x" }
  }
}
resource "aws_s3_bucket" "logs" {
  bucket = "logs"
}
"#;
        let result = sanitize(code);
        assert_eq!(
            result.body,
            "resource \"aws_s3_bucket\" \"logs\" {\n  bucket = \"logs\"\n}\n"
        );
        assert_eq!(result.removed, vec!["provider \"aws\"".to_string()]);
    }

    #[test]
    fn test_removes_terraform_block_with_required_providers() {
        let code = r#"terraform {
  required_providers {
    aws = {
      source  = "hashicorp/aws"
      version = "~> 4.0"
    }
  }
  backend "s3" {
    bucket = "attacker-state"
  }
}

resource "aws_instance" "web" {
  ami = "ami-123"
}
"#;
        let result = sanitize(code);
        assert!(!result.body.contains("required_providers"));
        assert!(!result.body.contains("attacker-state"));
        assert!(result.body.contains("resource \"aws_instance\" \"web\""));
        assert_eq!(result.removed, vec!["terraform".to_string()]);
    }

    #[test]
    fn test_formatting_variations() {
        let code = "  provider   \"aws\"\n  {\n\tregion=\"x\"}\nresource \"a\" \"b\" {}\nprovider \"aws\" { alias = \"west\" }";
        let result = sanitize(code);
        assert_eq!(result.body, "resource \"a\" \"b\" {}\n");
        assert_eq!(result.removed.len(), 2);
    }

    #[test]
    fn test_unquoted_label_and_no_label() {
        let code = "provider aws {\n region = \"x\"\n}\nprovider {\n}\noutput \"o\" { value = 1 }\n";
        let result = sanitize(code);
        assert_eq!(result.body, "output \"o\" { value = 1 }\n");
    }

    #[test]
    fn test_removes_block_nested_in_module() {
        let code = r#"module "vpc" {
  source = "./vpc"
  provider "aws" {
    region = "us-west-2"
  }
}
"#;
        let result = sanitize(code);
        assert_eq!(result.body, "module \"vpc\" {\n  source = \"./vpc\"\n}\n");
    }

    #[test]
    fn test_braces_inside_strings_and_comments() {
        let code = r#"provider "aws" {
  region = "us-east-1}" # closing } in comment
  /* } } */
  // }
  profile = "${lookup({a = "}"}, "a")}"
}
resource "aws_s3_bucket" "b" {
  bucket = "b"
}
"#;
        let result = sanitize(code);
        assert_eq!(
            result.body,
            "resource \"aws_s3_bucket\" \"b\" {\n  bucket = \"b\"\n}\n"
        );
    }

    #[test]
    fn test_escaped_template_markers_do_not_hide_blocks() {
        for escaped in ["$${{", "%%{{", "$${", "%%{ if", "$$${", "%%%{", "$$$${{"] {
            let code = format!(
                "locals {{\n  a = \"{}\"\n}}\nprovider \"aws\" {{\n  region = \"evil-region\"\n}}\nresource \"aws_s3_bucket\" \"b\" {{\n  bucket = \"b\"\n}}\n",
                escaped
            );
            let result = sanitize(&code);
            assert_eq!(result.removed, vec!["provider \"aws\"".to_string()], "escape {}", escaped);
            assert!(!result.body.contains("evil-region"));
            assert!(result.body.contains(&format!("a = \"{}\"", escaped)));
            assert!(result.body.contains("resource \"aws_s3_bucket\" \"b\""));
        }
    }

    #[test]
    fn test_escaped_and_real_templates_mixed() {
        let code = r#"locals {
  a = "$${literal} and ${var.name}-%%{x} %{ if true }{yes}%{ endif }"
  b = "${lookup(var.m, "}")}"
}
terraform {
  backend "s3" {
    bucket = "attacker-state"
  }
}
resource "aws_s3_bucket" "b" {
  bucket = "b"
}
"#;
        let result = sanitize(code);
        assert_eq!(result.removed, vec!["terraform".to_string()]);
        assert!(!result.body.contains("attacker-state"));
        assert!(result.body.contains("%{ endif }"));
        assert!(result.body.contains("resource \"aws_s3_bucket\" \"b\""));
    }

    #[test]
    fn test_heredoc_inside_provider() {
        let code = "provider \"aws\" {\n  policy = <<EOF\n{ \"a\": { } } }\nEOF\n}\nresource \"x\" \"y\" {}\n";
        let result = sanitize(code);
        assert_eq!(result.body, "resource \"x\" \"y\" {}\n");
    }

    #[test]
    fn test_heredoc_mentioning_provider_is_kept() {
        let code = "resource \"local_file\" \"f\" {\n  content = <<-EOT\n    provider \"aws\" {\n    }\n  EOT\n}\n";
        let result = sanitize(code);
        assert_eq!(result.body, code);
    }

    #[test]
    fn test_provider_attribute_is_kept() {
        let code = "resource \"aws_s3_bucket\" \"b\" {\n  provider = aws.west\n  bucket   = \"b\"\n}\n";
        let result = sanitize(code);
        assert_eq!(result.body, code);
    }

    #[test]
    fn test_similar_identifiers_are_kept() {
        let code = "data \"terraform_remote_state\" \"net\" {\n  backend = \"s3\"\n}\nterraform_thing \"x\" {}\nresource \"provider_x\" \"y\" {}\n";
        let result = sanitize(code);
        assert_eq!(result.body, code);
    }

    #[test]
    fn test_unterminated_block_removes_rest() {
        let code = "resource \"a\" \"b\" {}\nprovider \"aws\" {\n  region = \"x\"\n  assume_role {\n";
        let result = sanitize(code);
        assert_eq!(result.body, "resource \"a\" \"b\" {}\n");
        assert_eq!(result.removed.len(), 1);
    }

    #[test]
    fn test_custom_kinds() {
        let sanitizer = Sanitizer::new(["backend"]);
        let code = "backend \"s3\" { bucket = \"x\" }\nprovider \"aws\" {}\n";
        let result = sanitizer.sanitize(code);
        assert_eq!(result.body, "provider \"aws\" {}\n");
    }

    #[test]
    fn test_non_ascii_text_survives() {
        let code = "# Überprüfung ✓\nprovider \"aws\" {}\nresource \"a\" \"b\" { tags = { Name = \"日本\" } }\n";
        let result = sanitize(code);
        assert_eq!(
            result.body,
            "# Überprüfung ✓\nresource \"a\" \"b\" { tags = { Name = \"日本\" } }\n"
        );
    }
}
