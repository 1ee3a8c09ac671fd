//! Tokenizer and parser for AWL programs.
//!
//! Statements end at a top-level `;` or newline. Quoted strings, brackets and
//! parentheses are kept intact, so separators inside arguments or JSON return
//! values never split a statement.

use serde_json::Value;
use std::iter::Peekable;
use std::str::Chars;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("No action found in the program body")]
    Empty,

    #[error("Invalid action format: {0}")]
    InvalidStatement(String),

    #[error("Unterminated string literal: {0}")]
    UnterminatedString(String),

    #[error("Unknown action: {0}")]
    UnknownAction(String),

    #[error("Invalid number of arguments for {name}: expected {expected}, got {got}")]
    ArgumentCount {
        name: String,
        expected: &'static str,
        got: usize,
    },

    #[error("Programs hold one action and an optional think, got {0} statements")]
    TooManyStatements(usize),

    #[error("Only think may precede the action: {0}")]
    UnexpectedStatement(String),

    #[error("Invalid bounding box: {0}")]
    InvalidBoundingBox(String),
}

/// One statement, before its arguments are checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    /// `name("arg", ...)`. Only double-quoted literals count as arguments.
    Call { name: String, args: Vec<String> },
    /// `return;` or `return <value>;` with the value text untouched.
    Return { value: Option<String> },
    /// `throw "message";`
    Throw { message: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Click { bbox: String },
    Type { value: String, bbox: String, press_enter: bool },
    Scroll { direction: String, bbox: String },
    GoToUrl { url: String },
    Think { thought: String },
    /// JSON-decoded when possible, otherwise the raw text as a string.
    Return { value: Option<Value> },
    Throw { message: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub thought: Option<String>,
    pub action: Action,
}

/// Split a program into statements.
pub fn tokenize(source: &str) -> Result<Vec<Statement>, ParseError> {
    split_statements(source)?
        .iter()
        .map(String::as_str)
        .map(parse_statement)
        .collect()
}

/// Parse a full program: one action, optionally preceded by `think`.
pub fn parse_program(source: &str) -> Result<Program, ParseError> {
    let statements = tokenize(source)?;
    let count = statements.len();
    let mut statements = statements.into_iter();

    match (statements.next(), statements.next()) {
        (None, _) => Err(ParseError::Empty),
        (Some(action), None) => Ok(Program {
            thought: None,
            action: Action::from_statement(action)?,
        }),
        (Some(first), Some(action)) if count == 2 => {
            let thought = match first {
                Statement::Call { name, args } if name == "think" => {
                    args.into_iter().next().ok_or(ParseError::ArgumentCount {
                        name,
                        expected: "1",
                        got: 0,
                    })?
                }
                other => return Err(ParseError::UnexpectedStatement(format!("{other:?}"))),
            };
            Ok(Program {
                thought: Some(thought),
                action: Action::from_statement(action)?,
            })
        }
        _ => Err(ParseError::TooManyStatements(count)),
    }
}

impl Action {
    pub fn from_statement(statement: Statement) -> Result<Self, ParseError> {
        let (name, args) = match statement {
            Statement::Return { value } => {
                let value = value.map(|raw| {
                    serde_json::from_str(&raw).unwrap_or_else(|_| Value::String(raw))
                });
                return Ok(Action::Return { value });
            }
            Statement::Throw { message } => return Ok(Action::Throw { message }),
            Statement::Call { name, args } => (name, args),
        };

        let count_error = |expected: &'static str| ParseError::ArgumentCount {
            name: name.clone(),
            expected,
            got: args.len(),
        };

        let action = match (name.as_str(), args.as_slice()) {
            ("agentClick", [bbox, ..]) => Action::Click { bbox: bbox.clone() },
            ("agentClick", _) => return Err(count_error("at least 1")),
            ("agentType", [value, bbox]) => Action::Type {
                value: value.clone(),
                bbox: bbox.clone(),
                press_enter: false,
            },
            ("agentType", [value, bbox, flag]) => Action::Type {
                value: value.clone(),
                bbox: bbox.clone(),
                press_enter: flag == "pressEnter",
            },
            ("agentType", _) => return Err(count_error("2 or 3")),
            ("agentScroll", [direction, bbox]) => Action::Scroll {
                direction: direction.clone(),
                bbox: bbox.clone(),
            },
            ("agentScroll", _) => return Err(count_error("2")),
            ("goToUrl", [url]) => Action::GoToUrl { url: url.clone() },
            ("goToUrl", _) => return Err(count_error("1")),
            ("think", [thought, ..]) => Action::Think {
                thought: thought.clone(),
            },
            ("think", _) => return Err(count_error("at least 1")),
            _ => return Err(ParseError::UnknownAction(name.clone())),
        };
        Ok(action)
    }
}

fn flush(statements: &mut Vec<String>, current: &mut String) {
    let text = current.trim();
    if !text.is_empty() {
        statements.push(text.to_string());
    }
    current.clear();
}

fn split_statements(source: &str) -> Result<Vec<String>, ParseError> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    let mut chars = source.chars().peekable();

    while let Some(c) = chars.next() {
        if in_string {
            current.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }

        match c {
            '"' => {
                in_string = true;
                current.push(c);
            }
            '(' | '[' | '{' => {
                depth += 1;
                current.push(c);
            }
            ')' | ']' | '}' => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            ';' | '\n' if depth == 0 => flush(&mut statements, &mut current),
            // Escaped line breaks between statements.
            '\\' if depth == 0 && chars.peek() == Some(&'n') => {
                chars.next();
                flush(&mut statements, &mut current);
            }
            _ => current.push(c),
        }
    }

    if in_string {
        return Err(ParseError::UnterminatedString(current.trim().to_string()));
    }
    flush(&mut statements, &mut current);
    Ok(statements)
}

/// `text` minus a leading keyword, if the keyword stands alone.
fn strip_keyword<'a>(text: &'a str, keyword: &str) -> Option<&'a str> {
    let rest = text.strip_prefix(keyword)?;
    if rest.is_empty() || rest.starts_with(char::is_whitespace) {
        Some(rest.trim())
    } else {
        None
    }
}

fn parse_statement(text: &str) -> Result<Statement, ParseError> {
    if let Some(rest) = strip_keyword(text, "return") {
        let value = (!rest.is_empty()).then(|| rest.to_string());
        return Ok(Statement::Return { value });
    }

    if let Some(rest) = strip_keyword(text, "throw") {
        let message = match string_literals(rest)?.as_slice() {
            [message] if rest.starts_with('"') && rest.ends_with('"') => message.clone(),
            _ => rest.to_string(),
        };
        return Ok(Statement::Throw { message });
    }

    let name_end = text
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .unwrap_or(text.len());
    let (name, rest) = text.split_at(name_end);
    let inner = rest
        .trim()
        .strip_prefix('(')
        .and_then(|rest| rest.strip_suffix(')'));

    match inner {
        Some(inner) if !name.is_empty() => Ok(Statement::Call {
            name: name.to_string(),
            args: string_literals(inner)?,
        }),
        _ => Err(ParseError::InvalidStatement(text.to_string())),
    }
}

/// Every double-quoted literal in `text`, decoded. Anything between literals
/// is ignored.
fn string_literals(text: &str) -> Result<Vec<String>, ParseError> {
    let mut literals = Vec::new();
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '"' {
            literals.push(read_literal(&mut chars, text)?);
        }
    }
    Ok(literals)
}

/// Read up to the closing quote, the opening one already consumed.
fn read_literal(chars: &mut Peekable<Chars<'_>>, source: &str) -> Result<String, ParseError> {
    let mut literal = String::new();
    while let Some(c) = chars.next() {
        match c {
            '"' => return Ok(literal),
            '\\' => match chars.next() {
                Some('n') => literal.push('\n'),
                Some('t') => literal.push('\t'),
                Some('r') => literal.push('\r'),
                Some('"') => literal.push('"'),
                Some('\\') => literal.push('\\'),
                Some('/') => literal.push('/'),
                Some('x') => match read_hex(chars, 2) {
                    Some(code) => literal.extend(char::from_u32(code)),
                    None => literal.push_str("\\x"),
                },
                Some('u') => match read_unicode_escape(chars) {
                    Some(decoded) => literal.push(decoded),
                    None => literal.push_str("\\u"),
                },
                Some(other) => {
                    literal.push('\\');
                    literal.push(other);
                }
                None => break,
            },
            _ => literal.push(c),
        }
    }
    Err(ParseError::UnterminatedString(source.to_string()))
}

/// Consume exactly `digits` hex digits. Nothing is consumed on a mismatch.
fn read_hex(chars: &mut Peekable<Chars<'_>>, digits: usize) -> Option<u32> {
    let lookahead: String = chars.clone().take(digits).collect();
    if lookahead.chars().count() != digits || !lookahead.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let code = u32::from_str_radix(&lookahead, 16).ok()?;
    for _ in 0..digits {
        chars.next();
    }
    Some(code)
}

/// `\uXXXX`, joining a UTF-16 surrogate pair written as two escapes.
fn read_unicode_escape(chars: &mut Peekable<Chars<'_>>) -> Option<char> {
    let high = read_hex(chars, 4)?;
    if !(0xD800..0xDC00).contains(&high) {
        return Some(char::from_u32(high).unwrap_or(char::REPLACEMENT_CHARACTER));
    }

    let mut rest = chars.clone();
    if rest.next() == Some('\\') && rest.next() == Some('u') {
        if let Some(low) = read_hex(&mut rest, 4).filter(|low| (0xDC00..0xE000).contains(low)) {
            *chars = rest;
            let code = 0x10000 + ((high - 0xD800) << 10) + (low - 0xDC00);
            return Some(char::from_u32(code).unwrap_or(char::REPLACEMENT_CHARACTER));
        }
    }
    Some(char::REPLACEMENT_CHARACTER)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use serde_json::json;

    fn call(name: &str, args: &[&str]) -> Statement {
        Statement::Call {
            name: name.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }

    #[test]
    fn test_tokenize_think_and_action() {
        let statements = tokenize(
            "think(\"I see a search field; it is empty\");\nagentType(\"coffee maker\", \"<box>10,382,48,1136</box>\");",
        )
        .unwrap();
        assert_eq!(
            statements,
            vec![
                call("think", &["I see a search field; it is empty"]),
                call("agentType", &["coffee maker", "<box>10,382,48,1136</box>"]),
            ]
        );
    }

    #[test]
    fn test_commas_inside_quotes_stay_in_argument() {
        let statements = tokenize("agentType(\"Seattle, WA\", \"<box>1,2,3,4</box>\", \"pressEnter\");").unwrap();
        assert_eq!(
            statements,
            vec![call("agentType", &["Seattle, WA", "<box>1,2,3,4</box>", "pressEnter"])]
        );
    }

    #[test]
    fn test_escaped_quotes_and_newlines() {
        let statements = tokenize("think(\"say \\\"hi\\\"\\nthen go\");\\nagentClick(\"<box>0,0,1,1</box>\");").unwrap();
        assert_eq!(
            statements,
            vec![
                call("think", &["say \"hi\"\nthen go"]),
                call("agentClick", &["<box>0,0,1,1</box>"]),
            ]
        );
    }

    #[test]
    fn test_unicode_and_hex_escapes_decode() {
        let statements = tokenize(
            r#"agentType("caf\u00e9 \ud83d\ude00 \x41", "<box>0,0,1,1</box>");"#,
        )
        .unwrap();
        assert_eq!(
            statements,
            vec![call("agentType", &["café 😀 A", "<box>0,0,1,1</box>"])]
        );

        // Malformed sequences stay as written.
        assert_eq!(
            tokenize(r#"think("\u12 and \xZ");"#).unwrap(),
            vec![call("think", &["\\u12 and \\xZ"])]
        );
        assert_eq!(
            tokenize(r#"think("\ud83d alone");"#).unwrap(),
            vec![call("think", &["\u{FFFD} alone"])]
        );
    }

    #[test]
    fn test_return_forms() {
        assert_eq!(tokenize("return;").unwrap(), vec![Statement::Return { value: None }]);
        assert_eq!(tokenize("return").unwrap(), vec![Statement::Return { value: None }]);
        assert_eq!(
            tokenize("return {\"price\": 12; \"ok\": true};").unwrap(),
            vec![Statement::Return {
                value: Some("{\"price\": 12; \"ok\": true}".to_string())
            }]
        );
    }

    #[test]
    fn test_return_value_decoding() {
        let program = parse_program("return \"done\";").unwrap();
        assert_eq!(program.action, Action::Return { value: Some(json!("done")) });

        let program = parse_program("return {\"count\": 3};").unwrap();
        assert_eq!(program.action, Action::Return { value: Some(json!({"count": 3})) });

        let program = parse_program("return not json;").unwrap();
        assert_eq!(program.action, Action::Return { value: Some(json!("not json")) });
    }

    #[test]
    fn test_throw_decodes_literal() {
        let program = parse_program("throw \"Item is out of stock\";").unwrap();
        assert_eq!(
            program.action,
            Action::Throw {
                message: "Item is out of stock".to_string()
            }
        );

        let program = parse_program("throw bare words;").unwrap();
        assert_eq!(program.action, Action::Throw { message: "bare words".to_string() });
    }

    #[test]
    fn test_keywords_need_a_boundary() {
        let err = parse_program("returnValue();").unwrap_err();
        assert_eq!(err, ParseError::UnknownAction("returnValue".to_string()));
    }

    #[test]
    fn test_parse_program_with_thought() {
        let program = parse_program("think(\"x\");\nagentClick(\"<box>0,0,10,10</box>\");").unwrap();
        assert_eq!(program.thought.as_deref(), Some("x"));
        assert_eq!(
            program.action,
            Action::Click {
                bbox: "<box>0,0,10,10</box>".to_string()
            }
        );
    }

    #[test]
    fn test_press_enter_flag() {
        let program = parse_program("agentType(\"socks\", \"<box>1,2,3,4</box>\", \"pressEnter\");").unwrap();
        assert!(matches!(program.action, Action::Type { press_enter: true, .. }));

        let program = parse_program("agentType(\"socks\", \"<box>1,2,3,4</box>\");").unwrap();
        assert!(matches!(program.action, Action::Type { press_enter: false, .. }));
    }

    #[test]
    fn test_argument_counts() {
        let cases = [
            "agentClick();",
            "agentType(\"only value\");",
            "agentScroll(\"down\");",
            "goToUrl(\"a.com\", \"b.com\");",
        ];
        for source in cases {
            let err = parse_program(source).unwrap_err();
            assert!(matches!(err, ParseError::ArgumentCount { .. }), "{source}: {err:?}");
        }
    }

    #[test]
    fn test_multi_statement_programs_rejected() {
        let err = parse_program("agentClick(\"<box>0,0,1,1</box>\");\nagentClick(\"<box>0,0,1,1</box>\");")
            .unwrap_err();
        assert!(matches!(err, ParseError::UnexpectedStatement(_)));

        let err = parse_program("think(\"a\");\nthink(\"b\");\nreturn;").unwrap_err();
        assert_eq!(err, ParseError::TooManyStatements(3));
    }

    #[test]
    fn test_malformed_input() {
        assert_eq!(parse_program("  \n ; ").unwrap_err(), ParseError::Empty);
        assert!(matches!(
            parse_program("click the button").unwrap_err(),
            ParseError::InvalidStatement(_)
        ));
        assert!(matches!(
            parse_program("agentClick(\"<box>0,0,1,1</box>);").unwrap_err(),
            ParseError::UnterminatedString(_)
        ));
        assert_eq!(
            parse_program("fly(\"away\");").unwrap_err(),
            ParseError::UnknownAction("fly".to_string())
        );
    }
}
