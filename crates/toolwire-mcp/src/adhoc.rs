//! Turning a single command string into a stdio server configuration.
//!
//! The string is split the way a POSIX shell splits words: single quotes are
//! literal, double quotes allow `\` escapes and variable expansion, and an
//! unquoted `\` escapes the next character. `$VAR` and `${VAR}` expand from
//! the environment (unset variables expand to nothing). Expansions are not
//! re-split into words. Control operators (`|`, `&`, `;`, `<`, `>`) are
//! rejected since there is no shell to run a pipeline.

use crate::config::ServerConfig;
use toolwire_core::{ToolwireError, ToolwireResult};

/// Name under which the ad-hoc server is registered. Overrides any
/// configured server of the same name.
pub const AD_HOC_SERVER_NAME: &str = "mcp";

/// Build a stdio config from `command`, expanding variables from the process
/// environment.
pub fn parse_command(command: &str) -> ToolwireResult<ServerConfig> {
    let mut words = tokenize(command, |name| std::env::var(name).ok())?.into_iter();
    let program = words.next().ok_or_else(|| {
        ToolwireError::Configuration("ad-hoc MCP server command is empty".into())
    })?;
    Ok(ServerConfig::stdio(program, words.collect()))
}

/// Split `input` into words, resolving variables with `lookup`.
pub fn tokenize<F>(input: &str, lookup: F) -> ToolwireResult<Vec<String>>
where
    F: Fn(&str) -> Option<String>,
{
    let mut words = Vec::new();
    let mut current = String::new();
    // Distinguishes `""` (an empty word) from no word at all.
    let mut in_word = false;
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            c if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            '\'' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(c) => current.push(c),
                        None => return Err(parse_error(input, "unterminated single quote")),
                    }
                }
            }
            '"' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some(c @ ('"' | '\\' | '$' | '`')) => current.push(c),
                            Some('\n') => {}
                            Some(c) => {
                                current.push('\\');
                                current.push(c);
                            }
                            None => return Err(parse_error(input, "unterminated double quote")),
                        },
                        Some('$') => expand(&mut chars, &mut current, &lookup, input)?,
                        Some(c) => current.push(c),
                        None => return Err(parse_error(input, "unterminated double quote")),
                    }
                }
            }
            '\\' => match chars.next() {
                Some('\n') => {}
                Some(c) => {
                    in_word = true;
                    current.push(c);
                }
                None => return Err(parse_error(input, "trailing backslash")),
            },
            '$' => {
                // An unquoted expansion to nothing does not start a word.
                let before = current.len();
                expand(&mut chars, &mut current, &lookup, input)?;
                in_word |= current.len() > before;
            }
            '|' | '&' | ';' | '<' | '>' => {
                return Err(parse_error(
                    input,
                    &format!("shell operator '{c}' is not supported"),
                ));
            }
            c => {
                in_word = true;
                current.push(c);
            }
        }
    }

    if in_word {
        words.push(current);
    }
    Ok(words)
}

/// Expand the variable reference following a `$`.
fn expand<I, F>(
    chars: &mut std::iter::Peekable<I>,
    out: &mut String,
    lookup: &F,
    input: &str,
) -> ToolwireResult<()>
where
    I: Iterator<Item = char>,
    F: Fn(&str) -> Option<String>,
{
    let mut name = String::new();
    if chars.peek() == Some(&'{') {
        chars.next();
        loop {
            match chars.next() {
                Some('}') => break,
                Some(c) => name.push(c),
                None => return Err(parse_error(input, "unterminated '${'")),
            }
        }
        if name.is_empty() {
            return Err(parse_error(input, "empty variable name in '${}'"));
        }
    } else {
        while let Some(&c) = chars.peek() {
            let valid =
                c == '_' || c.is_ascii_alphabetic() || (!name.is_empty() && c.is_ascii_digit());
            if !valid {
                break;
            }
            name.push(c);
            chars.next();
        }
        if name.is_empty() {
            // A lone `$` is literal.
            out.push('$');
            return Ok(());
        }
    }

    if let Some(value) = lookup(&name) {
        out.push_str(&value);
    }
    Ok(())
}

fn parse_error(input: &str, reason: &str) -> ToolwireError {
    ToolwireError::Configuration(format!(
        "could not parse ad-hoc MCP server command '{input}': {reason}"
    ))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn env(name: &str) -> Option<String> {
        match name {
            "HOME" => Some("/home/dev".to_string()),
            "PORT" => Some("8080".to_string()),
            "SPACED" => Some("a b".to_string()),
            _ => None,
        }
    }

    fn split(input: &str) -> Vec<String> {
        tokenize(input, env).unwrap()
    }

    #[test]
    fn test_plain_words() {
        assert_eq!(split("  npx  -y server  "), vec!["npx", "-y", "server"]);
    }

    #[test]
    fn test_quotes_group_words() {
        assert_eq!(
            split(r#"node "my server.js" 'it''s' """#),
            vec!["node", "my server.js", "its", ""]
        );
    }

    #[test]
    fn test_backslash_escapes() {
        assert_eq!(split(r"echo a\ b \$HOME"), vec!["echo", "a b", "$HOME"]);
        assert_eq!(split(r#""say \"hi\"""#), vec![r#"say "hi""#]);
    }

    #[test]
    fn test_variable_expansion() {
        assert_eq!(
            split("serve --root $HOME/data --port=${PORT} $MISSING x"),
            vec!["serve", "--root", "/home/dev/data", "--port=8080", "x"]
        );
        assert_eq!(split("'$HOME'"), vec!["$HOME"]);
        assert_eq!(split("\"$SPACED\""), vec!["a b"]);
        assert_eq!(split("cost $ 5"), vec!["cost", "$", "5"]);
    }

    #[test]
    fn test_unterminated_quote_is_configuration_error() {
        let err = tokenize("node 'oops", env).unwrap_err();
        assert!(matches!(err, ToolwireError::Configuration(_)));
        assert!(tokenize("node \"oops", env).is_err());
        assert!(tokenize("node ${HOME", env).is_err());
        assert!(tokenize("node \\", env).is_err());
    }

    #[test]
    fn test_operators_are_rejected() {
        assert!(tokenize("server | tee log", env).is_err());
        assert_eq!(split("'a|b'"), vec!["a|b"]);
    }

    #[test]
    fn test_parse_command_builds_stdio_config() {
        let config = parse_command("python -m my_server --verbose").unwrap();
        assert_eq!(config.command.as_deref(), Some("python"));
        assert_eq!(config.args, vec!["-m", "my_server", "--verbose"]);
        assert!(config.url.is_none() && config.http_url.is_none());
    }

    #[test]
    fn test_parse_command_rejects_empty() {
        assert!(parse_command("   ").is_err());
    }
}
