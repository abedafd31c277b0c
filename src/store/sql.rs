//! Translation of search expressions into SQL `WHERE` fragments.
//!
//! Only the part of the language that maps directly onto summary columns is
//! translated; anything else makes the translator decline, and the search
//! falls back to in-memory evaluation.

use chrono::Utc;

use crate::model::flags::MessageFlags;
use crate::search::eval::add_months;
use crate::sexp::Expr;

/// Turns an expression into a `WHERE` fragment for a folder's summary table.
pub trait SqlTranslator {
    /// `None` when the expression uses anything that cannot be expressed in SQL.
    fn translate(&self, expr: &Expr) -> Option<String>;
}

/// Translator for the [`SqliteStore`](crate::store::sqlite::SqliteStore) column layout.
#[derive(Debug, Default, Clone, Copy)]
pub struct SexpToSql;

impl SqlTranslator for SexpToSql {
    fn translate(&self, expr: &Expr) -> Option<String> {
        match expr {
            Expr::Bool(b) => Some(if *b { "1" } else { "0" }.to_string()),
            Expr::Int(n) => Some(n.to_string()),
            Expr::String(s) | Expr::Symbol(s) => Some(quote_literal(s)),
            Expr::Call { name, args } => self.call(name, args),
        }
    }
}

impl SexpToSql {
    fn call(&self, name: &str, args: &[Expr]) -> Option<String> {
        match name {
            "and" | "or" => {
                if args.is_empty() {
                    return Some(if name == "and" { "1" } else { "0" }.to_string());
                }
                let parts = args
                    .iter()
                    .map(|a| self.translate(a))
                    .collect::<Option<Vec<_>>>()?;
                let joiner = if name == "and" { " AND " } else { " OR " };
                Some(format!("({})", parts.join(joiner)))
            }
            "not" => match args.first() {
                Some(arg) => Some(format!("(NOT {})", self.translate(arg)?)),
                None => Some("1".to_string()),
            },
            "match-all" => match args.first() {
                Some(arg) => self.translate(arg),
                None => Some("1".to_string()),
            },
            "<" | ">" | "=" => {
                let [lhs, rhs] = args else {
                    return None;
                };
                Some(format!(
                    "({} {name} {})",
                    self.translate(lhs)?,
                    self.translate(rhs)?
                ))
            }
            "system-flag" => {
                let flag = args.first()?.as_text()?;
                Some(system_flag_column(flag))
            }
            "user-flag" => {
                let names = texts(args)?;
                if names.is_empty() {
                    return Some("0".to_string());
                }
                // Labels are space separated; instr keeps the lookup case-sensitive.
                if names.iter().any(|n| n.is_empty() || n.contains(char::is_whitespace)) {
                    return None;
                }
                let tests: Vec<String> = names
                    .iter()
                    .map(|n| {
                        format!(
                            "(instr(' ' || COALESCE(labels, '') || ' ', {}) > 0)",
                            quote_literal(&format!(" {n} "))
                        )
                    })
                    .collect();
                Some(format!("({})", tests.join(" OR ")))
            }
            "user-tag" => {
                let tag = args.first()?.as_text()?;
                if !tag.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
                    return None;
                }
                Some(format!(
                    "COALESCE(json_extract(usertags, '$.\"{tag}\"'), '')"
                ))
            }
            "header-matches" | "header-starts-with" => {
                let (column, patterns) = args.split_first()?;
                // Address and list headers compare parsed tokens, which LIKE cannot.
                if !column.as_text()?.eq_ignore_ascii_case("subject") {
                    return None;
                }
                let patterns = texts(patterns)?;
                if patterns.is_empty() {
                    return Some("0".to_string());
                }
                if patterns.iter().any(|p| p.is_empty()) {
                    return Some("1".to_string());
                }
                // LIKE folds ASCII case only.
                if !patterns.iter().all(|p| p.is_ascii()) {
                    return None;
                }
                let suffix = if name == "header-starts-with" { "%" } else { "" };
                let tests: Vec<String> = patterns
                    .iter()
                    .map(|p| {
                        format!(
                            "TRIM(subject) LIKE {} ESCAPE '\\'",
                            quote_literal(&format!("{}{suffix}", escape_like(p.trim())))
                        )
                    })
                    .collect();
                Some(format!("({})", tests.join(" OR ")))
            }
            "header-exists" => {
                let names = texts(args)?;
                if names.is_empty() {
                    return Some("0".to_string());
                }
                let tests = names
                    .iter()
                    .map(|n| header_column(n).map(|c| format!("COALESCE({c}, '') <> ''")))
                    .collect::<Option<Vec<_>>>()?;
                Some(format!("({})", tests.join(" OR ")))
            }
            "uid" => {
                let uids = texts(args)?;
                if uids.is_empty() {
                    return Some("0".to_string());
                }
                let list: Vec<String> = uids.iter().map(|u| quote_literal(u)).collect();
                Some(format!("uid IN ({})", list.join(", ")))
            }
            "get-sent-date" => Some("dsent".to_string()),
            "get-received-date" => Some("dreceived".to_string()),
            "get-size" => Some("(size / 1024)".to_string()),
            "get-current-date" => Some(Utc::now().timestamp().to_string()),
            "get-relative-months" => match args {
                [Expr::Int(months)] => Some(add_months(Utc::now().timestamp(), *months).to_string()),
                _ => None,
            },
            _ => None,
        }
    }
}

fn texts(args: &[Expr]) -> Option<Vec<&str>> {
    args.iter().map(Expr::as_text).collect()
}

/// Summary column holding a header the message always carries verbatim.
fn header_column(name: &str) -> Option<&'static str> {
    match name.to_ascii_lowercase().as_str() {
        "subject" => Some("subject"),
        "from" => Some("mail_from"),
        "to" => Some("mail_to"),
        "cc" => Some("mail_cc"),
        _ => None,
    }
}

fn system_flag_column(name: &str) -> String {
    match name.to_ascii_lowercase().as_str() {
        "seen" => "(read = 1)".to_string(),
        "deleted" => "(deleted = 1)".to_string(),
        "answered" => "(replied = 1)".to_string(),
        "flagged" => "(important = 1)".to_string(),
        "junk" => "(junk = 1)".to_string(),
        "attachments" => "(attachment = 1)".to_string(),
        other => match MessageFlags::by_name(other) {
            Some(flag) => format!("((flags & {}) <> 0)", flag.bits()),
            None => "0".to_string(),
        },
    }
}

/// Quote a string as an SQL literal.
pub fn quote_literal(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// Quote a name as an SQL identifier (folder names become table names).
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Escape `LIKE` wildcards; pair with `ESCAPE '\'`.
fn escape_like(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sexp::parse;

    fn sql(expr: &str) -> Option<String> {
        SexpToSql.translate(&parse(expr).unwrap())
    }

    #[test]
    fn test_translate_flags_and_logic() {
        assert_eq!(
            sql(r#"(match-all (and (system-flag "seen") (not (system-flag "deleted"))))"#)
                .as_deref(),
            Some("((read = 1) AND (NOT (deleted = 1)))")
        );
        assert_eq!(sql("(match-all)").as_deref(), Some("1"));
        assert_eq!(sql("(or)").as_deref(), Some("0"));
    }

    #[test]
    fn test_translate_headers() {
        assert_eq!(
            sql(r#"(header-starts-with "subject" "50%")"#).as_deref(),
            Some(r"(TRIM(subject) LIKE '50\%%' ESCAPE '\')")
        );
        assert_eq!(
            sql(r#"(header-matches "Subject" " o'brien ")"#).as_deref(),
            Some(r"(TRIM(subject) LIKE 'o''brien' ESCAPE '\')")
        );
        assert_eq!(sql(r#"(header-matches "subject" "x" "")"#).as_deref(), Some("1"));
        assert_eq!(sql(r#"(header-matches "x-spam" "yes")"#), None);
        assert_eq!(
            sql(r#"(header-exists "from")"#).as_deref(),
            Some("(COALESCE(mail_from, '') <> '')")
        );
    }

    #[test]
    fn test_declines_what_like_cannot_match() {
        assert_eq!(sql(r#"(header-matches "from" "alice@example.com")"#), None);
        assert_eq!(sql(r#"(header-starts-with "cc" "bob")"#), None);
        assert_eq!(sql(r#"(header-matches "x-camel-mlist" "dev.example.org")"#), None);
        assert_eq!(sql(r#"(header-matches "subject" "CAFÉ")"#), None);
        assert_eq!(sql(r#"(user-flag "two words")"#), None);
        assert_eq!(sql(r#"(user-flag "")"#), None);
    }

    #[test]
    fn test_translate_user_flag() {
        assert_eq!(
            sql(r#"(user-flag "work")"#).as_deref(),
            Some("((instr(' ' || COALESCE(labels, '') || ' ', ' work ') > 0))")
        );
    }

    #[test]
    fn test_translate_comparisons() {
        assert_eq!(
            sql("(> (get-size) 100)").as_deref(),
            Some("((size / 1024) > 100)")
        );
        assert_eq!(
            sql(r#"(uid "1" "2")"#).as_deref(),
            Some("uid IN ('1', '2')")
        );
        assert_eq!(sql("(< 1)"), None);
    }

    #[test]
    fn test_declines_unknown() {
        assert_eq!(sql(r#"(body-contains "x")"#), None);
        assert_eq!(sql(r#"(and (system-flag "seen") (frobnicate))"#), None);
    }

    #[test]
    fn test_quote_identifier() {
        assert_eq!(quote_identifier("Inbox"), "\"Inbox\"");
        assert_eq!(quote_identifier("a\"b"), "\"a\"\"b\"");
    }
}
