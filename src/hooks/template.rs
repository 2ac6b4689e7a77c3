//! Hook command template expansion.
//!
//! Supports `{store_prefix}` and `{fetch_shards}`; `{{` and `}}` are literal
//! braces.

use super::HookContext;
use crate::{Error, Result};

pub fn render_template(template: &str, context: &HookContext) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '{' => {
                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(ch) => name.push(ch),
                        None => {
                            return Err(Error::Hook(format!(
                                "unclosed placeholder '{{{}' in command template",
                                name
                            )))
                        }
                    }
                }
                match name.as_str() {
                    "store_prefix" => out.push_str(&context.store_prefix.to_string_lossy()),
                    "fetch_shards" => out.push_str(&context.fetch_shards),
                    other => {
                        return Err(Error::Hook(format!(
                            "unknown placeholder '{{{}}}' in command template",
                            other
                        )))
                    }
                }
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '}' => {
                return Err(Error::Hook(
                    "single '}' in command template; use '}}'".to_string(),
                ))
            }
            _ => out.push(c),
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn ctx() -> HookContext {
        HookContext {
            store_prefix: PathBuf::from("/home/pi/.lightlog"),
            fetch_shards: "2024/02/29.json,2024/03/01.json".to_string(),
        }
    }

    #[test]
    fn test_substitutes_both_placeholders() {
        let rendered = render_template(
            "rsync -a {store_prefix}/ remote: --files {fetch_shards}",
            &ctx(),
        )
        .unwrap();
        assert_eq!(
            rendered,
            "rsync -a /home/pi/.lightlog/ remote: --files 2024/02/29.json,2024/03/01.json"
        );
    }

    #[test]
    fn test_escaped_braces() {
        let rendered = render_template("awk '{{print $1}}' {store_prefix}", &ctx()).unwrap();
        assert_eq!(rendered, "awk '{print $1}' /home/pi/.lightlog");
    }

    #[test]
    fn test_rejects_unknown_and_unbalanced() {
        assert!(render_template("echo {nope}", &ctx()).is_err());
        assert!(render_template("echo {store_prefix", &ctx()).is_err());
        assert!(render_template("echo }", &ctx()).is_err());
    }
}
