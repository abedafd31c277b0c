//! Tokenizer and recursive-descent parser for search expressions.

use crate::error::{Result, SearchError};
use crate::sexp::Expr;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Open,
    Close,
    Str(String),
    Atom(String),
}

/// Parse an expression string into a tree.
///
/// An empty (or comment-only) expression means `(match-all)`.
pub fn parse(input: &str) -> Result<Expr> {
    let tokens = tokenize(input).map_err(|reason| parse_error(input, reason))?;
    if tokens.is_empty() {
        return Ok(Expr::call("match-all", Vec::new()));
    }

    let mut pos = 0;
    let expr = parse_expr(&tokens, &mut pos).map_err(|reason| parse_error(input, reason))?;
    if pos != tokens.len() {
        return Err(parse_error(input, "unexpected input after expression".into()));
    }
    Ok(expr)
}

fn parse_error(input: &str, reason: String) -> SearchError {
    SearchError::Parse {
        expression: input.to_string(),
        reason,
    }
}

fn tokenize(input: &str) -> std::result::Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '(' => tokens.push(Token::Open),
            ')' => tokens.push(Token::Close),
            ';' => {
                for c in chars.by_ref() {
                    if c == '\n' {
                        break;
                    }
                }
            }
            '"' => {
                let mut text = String::new();
                let mut closed = false;
                while let Some(c) = chars.next() {
                    match c {
                        '"' => {
                            closed = true;
                            break;
                        }
                        '\\' => match chars.next() {
                            Some('n') => text.push('\n'),
                            Some('t') => text.push('\t'),
                            Some(other) => text.push(other),
                            None => break,
                        },
                        _ => text.push(c),
                    }
                }
                if !closed {
                    return Err("unterminated string".into());
                }
                tokens.push(Token::Str(text));
            }
            c if c.is_whitespace() => {}
            _ => {
                let mut atom = String::from(ch);
                while let Some(&c) = chars.peek() {
                    if c.is_whitespace() || c == '(' || c == ')' || c == '"' || c == ';' {
                        break;
                    }
                    atom.push(c);
                    chars.next();
                }
                tokens.push(Token::Atom(atom));
            }
        }
    }

    Ok(tokens)
}

fn parse_expr(tokens: &[Token], pos: &mut usize) -> std::result::Result<Expr, String> {
    let token = tokens
        .get(*pos)
        .ok_or_else(|| "unexpected end of expression".to_string())?;
    *pos += 1;

    match token {
        Token::Str(s) => Ok(Expr::String(s.clone())),
        Token::Atom(a) => Ok(atom(a)),
        Token::Close => Err("unbalanced ')'".into()),
        Token::Open => {
            let name = match tokens.get(*pos) {
                Some(Token::Atom(name)) => name.clone(),
                Some(Token::Close) => return Err("empty call '()'".into()),
                Some(_) => return Err("expected an operator name after '('".into()),
                None => return Err("missing ')'".into()),
            };
            *pos += 1;

            let mut args = Vec::new();
            loop {
                match tokens.get(*pos) {
                    Some(Token::Close) => {
                        *pos += 1;
                        return Ok(Expr::Call { name, args });
                    }
                    Some(_) => args.push(parse_expr(tokens, pos)?),
                    None => return Err("missing ')'".into()),
                }
            }
        }
    }
}

fn atom(text: &str) -> Expr {
    match text {
        "#t" => Expr::Bool(true),
        "#f" => Expr::Bool(false),
        _ => match text.parse::<i64>() {
            Ok(n) => Expr::Int(n),
            Err(_) => Expr::Symbol(text.to_string()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_nested_call() {
        let expr = parse(r#"(match-all (header-contains "subject" "hello world"))"#).unwrap();
        assert_eq!(
            expr,
            Expr::call(
                "match-all",
                vec![Expr::call(
                    "header-contains",
                    vec![
                        Expr::String("subject".into()),
                        Expr::String("hello world".into())
                    ]
                )]
            )
        );
    }

    #[test]
    fn test_parse_atoms() {
        let expr = parse("(f 42 -7 #t #f seen)").unwrap();
        let Expr::Call { args, .. } = expr else {
            panic!("expected call");
        };
        assert_eq!(
            args,
            vec![
                Expr::Int(42),
                Expr::Int(-7),
                Expr::Bool(true),
                Expr::Bool(false),
                Expr::Symbol("seen".into())
            ]
        );
    }

    #[test]
    fn test_parse_string_escapes() {
        let expr = parse(r#"(f "a \"quoted\" \\ word")"#).unwrap();
        let Expr::Call { args, .. } = expr else {
            panic!("expected call");
        };
        assert_eq!(args[0], Expr::String(r#"a "quoted" \ word"#.into()));
    }

    #[test]
    fn test_parse_comments_and_empty() {
        let expr = parse("; all mail\n(match-all) ; trailing").unwrap();
        assert_eq!(expr, Expr::call("match-all", vec![]));
        assert_eq!(parse("   ").unwrap(), Expr::call("match-all", vec![]));
    }

    #[test]
    fn test_parse_errors() {
        for bad in ["(match-all", ")", "(f \"open)", "()", "(a) (b)", "((a))"] {
            let err = parse(bad).unwrap_err();
            assert!(
                matches!(err, SearchError::Parse { ref expression, .. } if expression == bad),
                "{bad}: {err}"
            );
        }
    }
}
