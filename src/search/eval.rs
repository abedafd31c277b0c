//! The expression evaluator.
//!
//! Every built-in has two shapes. Inside `match-all` a *current message* is
//! passed down and predicates answer with a scalar about that message.
//! Outside it there is no current message and predicates answer with the
//! array of candidate identifiers for which they hold.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Months, Utc};
use regex::Regex;
use tracing::{debug, warn};

use crate::error::{Result, SearchError};
use crate::model::mail::{MessageInfo, Uid};
use crate::model::message::MimeMessage;
use crate::search::body::{match_words_message, message_matches_regex};
use crate::search::header::{check_header, has_header, header_regex_matches, render_headers};
use crate::search::index::{match_message_index, match_words_index, BodyIndex};
use crate::search::matcher::{build_regex, MatchMode};
use crate::search::thread::{ThreadForest, ThreadMode};
use crate::search::words::Words;
use crate::search::Cancellable;
use crate::sexp::{Expr, Value};
use crate::store::folder::Folder;

/// Built-in operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    And,
    Or,
    Not,
    Lt,
    Gt,
    Eq,
    MatchAll,
    MatchThreads,
    BodyContains,
    BodyRegex,
    HeaderContains,
    HeaderMatches,
    HeaderStartsWith,
    HeaderEndsWith,
    HeaderSoundex,
    HeaderHasWords,
    HeaderRegex,
    HeaderFullRegex,
    HeaderExists,
    SystemFlag,
    UserFlag,
    UserTag,
    GetSentDate,
    GetReceivedDate,
    GetCurrentDate,
    GetRelativeMonths,
    GetSize,
    Uid,
    MessageLocation,
}

impl Operator {
    pub fn from_name(name: &str) -> Option<Self> {
        let op = match name {
            "and" => Self::And,
            "or" => Self::Or,
            "not" => Self::Not,
            "<" => Self::Lt,
            ">" => Self::Gt,
            "=" => Self::Eq,
            "match-all" => Self::MatchAll,
            "match-threads" => Self::MatchThreads,
            "body-contains" => Self::BodyContains,
            "body-regex" => Self::BodyRegex,
            "header-contains" => Self::HeaderContains,
            "header-matches" => Self::HeaderMatches,
            "header-starts-with" => Self::HeaderStartsWith,
            "header-ends-with" => Self::HeaderEndsWith,
            "header-soundex" => Self::HeaderSoundex,
            "header-has-words" => Self::HeaderHasWords,
            "header-regex" => Self::HeaderRegex,
            "header-full-regex" => Self::HeaderFullRegex,
            "header-exists" => Self::HeaderExists,
            "system-flag" => Self::SystemFlag,
            "user-flag" => Self::UserFlag,
            "user-tag" => Self::UserTag,
            "get-sent-date" => Self::GetSentDate,
            "get-received-date" => Self::GetReceivedDate,
            "get-current-date" => Self::GetCurrentDate,
            "get-relative-months" => Self::GetRelativeMonths,
            "get-size" => Self::GetSize,
            "uid" => Self::Uid,
            "message-location" => Self::MessageLocation,
            _ => return None,
        };
        Some(op)
    }
}

/// `ts` shifted by whole calendar months. Days past the end of the target
/// month are clamped to its last day.
pub fn add_months(ts: i64, months: i64) -> i64 {
    let Some(date) = DateTime::<Utc>::from_timestamp(ts, 0) else {
        return ts;
    };
    let Ok(count) = u32::try_from(months.unsigned_abs()) else {
        return ts;
    };
    let shifted = if months >= 0 {
        date.checked_add_months(Months::new(count))
    } else {
        date.checked_sub_months(Months::new(count))
    };
    shifted.map_or(ts, |d| d.timestamp())
}

/// Per-invocation state shared by every built-in. Dropped when the
/// invocation ends.
pub struct SearchContext<'a> {
    folder: Option<&'a dyn Folder>,
    candidates: Vec<Uid>,
    candidate_set: HashSet<Uid>,
    body_index: Option<&'a dyn BodyIndex>,
    forest: Option<ThreadForest>,
    cancel: Cancellable,
    thread_subject_grouping: bool,
}

impl<'a> SearchContext<'a> {
    pub fn new(folder: Option<&'a dyn Folder>, candidates: Vec<Uid>, cancel: Cancellable) -> Self {
        let candidate_set = candidates.iter().cloned().collect();
        Self {
            folder,
            candidates,
            candidate_set,
            body_index: None,
            forest: None,
            cancel,
            thread_subject_grouping: true,
        }
    }

    pub fn with_body_index(mut self, index: Option<&'a dyn BodyIndex>) -> Self {
        self.body_index = index;
        self
    }

    pub fn with_subject_grouping(mut self, grouping: bool) -> Self {
        self.thread_subject_grouping = grouping;
        self
    }

    pub fn candidates(&self) -> &[Uid] {
        &self.candidates
    }

    /// Whether the thread forest has been built in this invocation.
    pub fn has_forest(&self) -> bool {
        self.forest.is_some()
    }
}

/// Tree-walking evaluator over one [`SearchContext`].
pub struct Evaluator<'a> {
    ctx: SearchContext<'a>,
}

impl<'a> Evaluator<'a> {
    pub fn new(ctx: SearchContext<'a>) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &SearchContext<'a> {
        &self.ctx
    }

    /// Evaluate `expr`, with `current` as the message under test inside
    /// `match-all`.
    pub fn eval(&mut self, expr: &Expr, current: Option<&MessageInfo>) -> Result<Value> {
        match expr {
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::Int(n) => Ok(Value::Int(*n)),
            Expr::String(s) | Expr::Symbol(s) => Ok(Value::String(s.clone())),
            Expr::Call { name, args } => {
                let op = Operator::from_name(name)
                    .ok_or_else(|| SearchError::UnknownOperator(name.clone()))?;
                self.call(op, name, args, current)
            }
        }
    }

    fn call(
        &mut self,
        op: Operator,
        name: &str,
        args: &[Expr],
        current: Option<&MessageInfo>,
    ) -> Result<Value> {
        // These two control evaluation of their own operands.
        match op {
            Operator::MatchAll => return self.match_all(args, current),
            Operator::MatchThreads => return self.match_threads(args, current),
            _ => {}
        }

        let values = args
            .iter()
            .map(|a| self.eval(a, current))
            .collect::<Result<Vec<_>>>()?;

        match op {
            Operator::And | Operator::Or => combine(name, op == Operator::And, values),
            Operator::Not => Ok(self.not(values, current)),
            Operator::Lt | Operator::Gt | Operator::Eq => compare(name, op, &values),
            Operator::BodyContains => self.body_contains(&values, current),
            Operator::BodyRegex => {
                let regex = build_regex(&strings(&values), true)?;
                self.message_predicate(current, |message| message_matches_regex(message, &regex))
            }
            Operator::HeaderRegex => self.header_regex(&values, current),
            Operator::HeaderFullRegex => {
                let regex = build_regex(&strings(&values), true)?;
                self.message_predicate(current, |message| {
                    regex.is_match(&render_headers(message))
                })
            }
            Operator::HeaderExists => {
                let names = strings(&values);
                self.message_predicate(current, |message| has_header(message, &names))
            }
            Operator::SystemFlag => {
                let flag = strings(&values).first().copied().unwrap_or_default().to_string();
                self.info_predicate(current, |info| Ok(info.flags.get_by_name(&flag)))
            }
            Operator::UserFlag => {
                let names = strings(&values);
                self.info_predicate(current, |info| Ok(names.iter().any(|n| info.user_flag(n))))
            }
            Operator::UserTag => Ok(match current {
                Some(info) => {
                    let tag = strings(&values).first().copied().unwrap_or_default();
                    Value::String(info.user_tag(tag).unwrap_or_default().to_string())
                }
                None => Value::Uids(Vec::new()),
            }),
            Operator::GetSentDate => Ok(scalar(current, |info| info.date_sent)),
            Operator::GetReceivedDate => Ok(scalar(current, |info| info.date_received)),
            Operator::GetSize => Ok(scalar(current, |info| (info.size / 1024) as i64)),
            Operator::GetCurrentDate => Ok(Value::Int(Utc::now().timestamp())),
            Operator::GetRelativeMonths => Ok(match values.as_slice() {
                [Value::Int(months)] => Value::Int(add_months(Utc::now().timestamp(), *months)),
                _ => Value::Bool(false),
            }),
            Operator::Uid => {
                let listed = strings(&values);
                Ok(match current {
                    Some(info) => Value::Bool(listed.iter().any(|u| *u == &*info.uid)),
                    None => {
                        let mut seen = HashSet::new();
                        let uids = listed
                            .into_iter()
                            .filter_map(|u| self.ctx.candidate_set.get(u).cloned())
                            .filter(|u| seen.insert(u.clone()))
                            .collect();
                        Value::Uids(uids)
                    }
                })
            }
            Operator::MessageLocation => {
                let here = self
                    .ctx
                    .folder
                    .map(|f| f.location_uri())
                    .unwrap_or_default();
                let matches = strings(&values).first().is_some_and(|uri| *uri == here);
                Ok(match current {
                    Some(_) => Value::Bool(matches),
                    None if matches => Value::Uids(self.ctx.candidates.clone()),
                    None => Value::Uids(Vec::new()),
                })
            }
            Operator::HeaderContains => {
                self.header_predicate(name, MatchMode::Contains, &values, current)
            }
            Operator::HeaderMatches => {
                self.header_predicate(name, MatchMode::Exact, &values, current)
            }
            Operator::HeaderStartsWith => {
                self.header_predicate(name, MatchMode::StartsWith, &values, current)
            }
            Operator::HeaderEndsWith => {
                self.header_predicate(name, MatchMode::EndsWith, &values, current)
            }
            Operator::HeaderSoundex => {
                self.header_predicate(name, MatchMode::Soundex, &values, current)
            }
            Operator::HeaderHasWords => {
                self.header_predicate(name, MatchMode::Word, &values, current)
            }
            Operator::MatchAll | Operator::MatchThreads => {
                unreachable!("handled before operand evaluation")
            }
        }
    }

    fn not(&self, values: Vec<Value>, current: Option<&MessageInfo>) -> Value {
        match values.into_iter().next() {
            Some(Value::Uids(uids)) => match current {
                Some(info) => Value::Bool(!uids.contains(&info.uid)),
                None => {
                    let exclude: HashSet<Uid> = uids.into_iter().collect();
                    Value::Uids(
                        self.ctx
                            .candidates
                            .iter()
                            .filter(|u| !exclude.contains(*u))
                            .cloned()
                            .collect(),
                    )
                }
            },
            Some(Value::Bool(b)) => Value::Bool(!b),
            _ => Value::Bool(true),
        }
    }

    fn match_all(&mut self, args: &[Expr], current: Option<&MessageInfo>) -> Result<Value> {
        if let Some(info) = current {
            return match args.first() {
                None => Ok(Value::Bool(true)),
                Some(arg) => match self.eval(arg, Some(info))? {
                    Value::Bool(b) => Ok(Value::Bool(b)),
                    other => Err(SearchError::type_error(
                        "match-all",
                        format!("operand must be a boolean, got {}", other.type_name()),
                    )),
                },
            };
        }

        let Some(folder) = self.ctx.folder else {
            warn!("match-all without a folder summary");
            return Ok(Value::Uids(Vec::new()));
        };
        if args.len() > 1 {
            warn!(operands = args.len(), "match-all only uses its first operand");
        }
        if folder.is_aggregate() {
            folder.prepare_fetch_all();
        }

        let candidates = self.ctx.candidates.clone();
        let mut matched = Vec::new();
        for uid in candidates {
            if self.ctx.cancel.is_cancelled() {
                debug!(matched = matched.len(), "match-all cancelled");
                break;
            }
            let Some(info) = folder.message_info(&uid) else {
                continue;
            };
            let keep = match args.first() {
                None => true,
                Some(arg) => match self.eval(arg, Some(&*info))? {
                    Value::Bool(b) => b,
                    other => {
                        return Err(SearchError::type_error(
                            "match-all",
                            format!("operand must be a boolean, got {}", other.type_name()),
                        ))
                    }
                },
            };
            if keep {
                matched.push(uid);
            }
        }
        Ok(Value::Uids(matched))
    }

    fn match_threads(&mut self, args: &[Expr], current: Option<&MessageInfo>) -> Result<Value> {
        if current.is_some() {
            return Err(SearchError::Fatal(
                "match-threads cannot be used inside match-all".into(),
            ));
        }
        if self.ctx.cancel.is_cancelled() {
            debug!("match-threads cancelled");
            return Ok(Value::Uids(Vec::new()));
        }
        let (mode, body) = args
            .split_first()
            .ok_or_else(|| SearchError::type_error("match-threads", "missing thread mode"))?;
        let mode = match self.eval(mode, None)? {
            Value::String(s) => s,
            other => {
                return Err(SearchError::type_error(
                    "match-threads",
                    format!("thread mode must be a string, got {}", other.type_name()),
                ))
            }
        };

        let mut last = None;
        for expr in body {
            last = Some(self.eval(expr, None)?);
        }
        let uids = match last {
            Some(Value::Uids(uids)) => uids,
            other => {
                return Err(SearchError::type_error(
                    "match-threads",
                    format!(
                        "last operand must be an array, got {}",
                        other.as_ref().map_or("nothing", Value::type_name)
                    ),
                ))
            }
        };

        let mode = ThreadMode::from_name(&mode).unwrap_or_else(|| {
            debug!(mode = %mode, "Unknown thread mode, results left unchanged");
            ThreadMode::None
        });
        if mode == ThreadMode::None {
            return Ok(Value::Uids(uids));
        }

        let cancel = self.ctx.cancel.clone();
        Ok(Value::Uids(self.forest().expand(&uids, mode, &cancel)))
    }

    /// The thread forest of all candidates, built on first use.
    fn forest(&mut self) -> &ThreadForest {
        let folder = self.ctx.folder;
        let candidates = &self.ctx.candidates;
        let grouping = self.ctx.thread_subject_grouping;
        self.ctx.forest.get_or_insert_with(|| {
            let infos: Vec<Arc<MessageInfo>> = folder
                .map(|f| candidates.iter().filter_map(|u| f.message_info(u)).collect())
                .unwrap_or_default();
            ThreadForest::build(&infos, grouping)
        })
    }

    fn header_predicate(
        &self,
        name: &str,
        mode: MatchMode,
        values: &[Value],
        current: Option<&MessageInfo>,
    ) -> Result<Value> {
        let (Some(folder), [Value::String(header), rest @ ..]) = (self.ctx.folder, values) else {
            return Ok(empty(current));
        };
        if rest.is_empty() {
            return Ok(empty(current));
        }
        let patterns = strings(rest);
        debug!(operator = name, header = %header, "Header test");
        self.info_predicate(current, |info| check_header(folder, info, header, &patterns, mode))
    }

    fn header_regex(&self, values: &[Value], current: Option<&MessageInfo>) -> Result<Value> {
        let [Value::String(header), rest @ ..] = values else {
            return Ok(empty(current));
        };
        if rest.is_empty() {
            return Ok(empty(current));
        }
        let regex: Regex = build_regex(&strings(rest), false)?;
        self.message_predicate(current, |message| header_regex_matches(message, header, &regex))
    }

    fn body_contains(&self, values: &[Value], current: Option<&MessageInfo>) -> Result<Value> {
        let patterns = strings(values);
        if let [""] = patterns.as_slice() {
            return Ok(match current {
                Some(_) => Value::Bool(true),
                None => Value::Uids(self.ctx.candidates.clone()),
            });
        }
        let Some(folder) = self.ctx.folder else {
            return Ok(empty(current));
        };
        let cancel = &self.ctx.cancel;
        let index = self.ctx.body_index;

        if let Some(info) = current {
            for pattern in &patterns {
                let words = Words::split(pattern)?;
                let hit = match index {
                    Some(index) if words.is_simple() => words
                        .iter()
                        .all(|w| match_message_index(index, &info.uid, &w.text)),
                    _ => match_words_message(folder, &info.uid, &words, cancel),
                };
                if hit {
                    return Ok(Value::Bool(true));
                }
            }
            return Ok(Value::Bool(false));
        }

        let mut seen: HashSet<Uid> = HashSet::new();
        let mut matched: Vec<Uid> = Vec::new();
        for pattern in &patterns {
            let words = Words::split(pattern)?;
            let hits = if words.is_empty() {
                self.ctx.candidates.clone()
            } else {
                match index {
                    Some(index) if words.is_simple() => {
                        match_words_index(index, &words, &self.ctx.candidate_set, cancel)
                    }
                    Some(index) => {
                        let narrowing = words.simple();
                        let pool = if narrowing.is_empty() {
                            self.ctx.candidates.clone()
                        } else {
                            match_words_index(index, &narrowing, &self.ctx.candidate_set, cancel)
                        };
                        pool.into_iter()
                            .filter(|uid| match_words_message(folder, uid, &words, cancel))
                            .collect()
                    }
                    None => self
                        .ctx
                        .candidates
                        .iter()
                        .filter(|uid| match_words_message(folder, uid, &words, cancel))
                        .cloned()
                        .collect(),
                }
            };
            for uid in hits {
                if seen.insert(uid.clone()) {
                    matched.push(uid);
                }
            }
        }
        Ok(Value::Uids(matched))
    }

    /// Run a summary-level test on the current message, or on every
    /// candidate when there is none.
    fn info_predicate(
        &self,
        current: Option<&MessageInfo>,
        mut test: impl FnMut(&MessageInfo) -> Result<bool>,
    ) -> Result<Value> {
        if let Some(info) = current {
            return Ok(Value::Bool(test(info)?));
        }
        let Some(folder) = self.ctx.folder else {
            return Ok(Value::Uids(Vec::new()));
        };
        let mut matched = Vec::new();
        for uid in &self.ctx.candidates {
            if self.ctx.cancel.is_cancelled() {
                break;
            }
            if let Some(info) = folder.message_info(uid) {
                if test(&*info)? {
                    matched.push(uid.clone());
                }
            }
        }
        Ok(Value::Uids(matched))
    }

    /// Run a test on the full message. Messages that cannot be fetched do
    /// not match.
    fn message_predicate(
        &self,
        current: Option<&MessageInfo>,
        test: impl Fn(&MimeMessage) -> bool,
    ) -> Result<Value> {
        let Some(folder) = self.ctx.folder else {
            return Ok(empty(current));
        };
        let fetch_and_test = |uid: &str| match folder.get_message(uid) {
            Ok(message) => test(&*message),
            Err(e) => {
                debug!(uid, error = %e, "Cannot fetch message");
                false
            }
        };
        if let Some(info) = current {
            return Ok(Value::Bool(fetch_and_test(&*info.uid)));
        }
        let mut matched = Vec::new();
        for uid in &self.ctx.candidates {
            if self.ctx.cancel.is_cancelled() {
                break;
            }
            if fetch_and_test(&**uid) {
                matched.push(uid.clone());
            }
        }
        Ok(Value::Uids(matched))
    }
}

/// The String operands, in order; other operand types are skipped.
fn strings(values: &[Value]) -> Vec<&str> {
    values
        .iter()
        .filter_map(|v| match v {
            Value::String(s) => Some(s.as_str()),
            _ => None,
        })
        .collect()
}

/// The "no match" result for the current shape.
fn empty(current: Option<&MessageInfo>) -> Value {
    match current {
        Some(_) => Value::Bool(false),
        None => Value::Uids(Vec::new()),
    }
}

/// An integer about the current message; an empty array without one.
fn scalar(current: Option<&MessageInfo>, get: impl Fn(&MessageInfo) -> i64) -> Value {
    match current {
        Some(info) => Value::Int(get(info)),
        None => Value::Uids(Vec::new()),
    }
}

fn combine(name: &str, all: bool, values: Vec<Value>) -> Result<Value> {
    if values.is_empty() {
        return Ok(Value::Bool(all));
    }
    if values.iter().all(|v| matches!(v, Value::Bool(_))) {
        let mut bools = values.iter().map(|v| matches!(v, Value::Bool(true)));
        let result = if all {
            bools.all(|b| b)
        } else {
            bools.any(|b| b)
        };
        return Ok(Value::Bool(result));
    }
    if !values.iter().all(Value::is_array) {
        let shapes: Vec<&str> = values.iter().map(Value::type_name).collect();
        return Err(SearchError::type_error(
            name,
            format!("operands must all be booleans or all arrays, got {}", shapes.join(", ")),
        ));
    }

    let mut arrays = values.into_iter().filter_map(|v| match v {
        Value::Uids(uids) => Some(uids),
        _ => None,
    });
    let first = arrays.next().unwrap_or_default();
    let mut seen: HashSet<Uid> = HashSet::new();

    if all {
        let rest: Vec<HashSet<Uid>> = arrays.map(|a| a.into_iter().collect()).collect();
        Ok(Value::Uids(
            first
                .into_iter()
                .filter(|u| rest.iter().all(|set| set.contains(u)))
                .filter(|u| seen.insert(u.clone()))
                .collect(),
        ))
    } else {
        Ok(Value::Uids(
            first
                .into_iter()
                .chain(arrays.flatten())
                .filter(|u| seen.insert(u.clone()))
                .collect(),
        ))
    }
}

fn compare(name: &str, op: Operator, values: &[Value]) -> Result<Value> {
    let ordering = match values {
        [Value::Int(a), Value::Int(b)] => a.cmp(b),
        [Value::String(a), Value::String(b)] => a.cmp(b),
        [a, b] => {
            return Err(SearchError::type_error(
                name,
                format!("cannot compare {} with {}", a.type_name(), b.type_name()),
            ))
        }
        _ => {
            return Err(SearchError::type_error(
                name,
                format!("expects exactly two operands, got {}", values.len()),
            ))
        }
    };
    let result = match op {
        Operator::Lt => ordering.is_lt(),
        Operator::Gt => ordering.is_gt(),
        _ => ordering.is_eq(),
    };
    Ok(Value::Bool(result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::flags::MessageFlags;
    use crate::model::message::{MimePart, RawHeader};
    use crate::search::index::MemoryIndex;
    use crate::sexp::parse;
    use crate::store::memory::MemoryFolder;

    fn folder() -> MemoryFolder {
        let mut folder = MemoryFolder::new("inbox");
        let rows = [
            ("1", "Invoice March", "alice@example.com", 2048, true),
            ("2", "Lunch?", "bob@example.com", 512, false),
            ("3", "RE: invoice march", "carol@example.com", 10_240, true),
        ];
        for (uid, subject, from, size, seen) in rows {
            let mut info = MessageInfo::new(uid);
            info.subject = subject.into();
            info.from = from.into();
            info.size = size;
            info.date_sent = 1_700_000_000 + uid.parse::<i64>().unwrap();
            if seen {
                info.flags.insert(MessageFlags::SEEN);
            }
            info.user_tags.insert("label".into(), format!("L{uid}"));
            let body = format!("Body of message {uid}: alpha{uid} shared words");
            let message = MimeMessage::new(
                vec![RawHeader::new("Subject", subject), RawHeader::new("X-Id", uid)],
                MimePart::text("text/plain", Some("utf-8"), body),
            );
            folder.add(info, Some(message));
        }
        folder
    }

    fn run(folder: &MemoryFolder, expr: &str) -> Result<Value> {
        let ctx = SearchContext::new(Some(folder), folder.summary(), Cancellable::new());
        Evaluator::new(ctx).eval(&parse(expr)?, None)
    }

    fn uids(value: Value) -> Vec<String> {
        match value {
            Value::Uids(u) => u.iter().map(|u| u.to_string()).collect(),
            other => panic!("expected array, got {other:?}"),
        }
    }

    #[test]
    fn test_match_all_header_contains() {
        let f = folder();
        let v = run(&f, r#"(match-all (header-contains "subject" "invoice"))"#).unwrap();
        assert_eq!(uids(v), vec!["1", "3"]);
    }

    #[test]
    fn test_array_and_or_not() {
        let f = folder();
        let v = run(&f, r#"(and (system-flag "seen") (header-contains "subject" "re:"))"#).unwrap();
        assert_eq!(uids(v), vec!["3"]);
        let v = run(&f, r#"(or (uid "2") (uid "1" "2"))"#).unwrap();
        assert_eq!(uids(v), vec!["2", "1"]);
        let v = run(&f, r#"(not (system-flag "seen"))"#).unwrap();
        assert_eq!(uids(v), vec!["2"]);
        assert_eq!(run(&f, "(and)").unwrap(), Value::Bool(true));
        assert_eq!(run(&f, "(or)").unwrap(), Value::Bool(false));
    }

    #[test]
    fn test_mixed_shapes_are_type_errors() {
        let f = folder();
        let err = run(&f, r#"(and #t (uid "1"))"#).unwrap_err();
        assert!(matches!(err, SearchError::Type { .. }), "{err}");
        let err = run(&f, r#"(< 1 "a")"#).unwrap_err();
        assert!(matches!(err, SearchError::Type { .. }), "{err}");
        let err = run(&f, "(= 1)").unwrap_err();
        assert!(matches!(err, SearchError::Type { .. }), "{err}");
    }

    #[test]
    fn test_comparisons_inside_match_all() {
        let f = folder();
        let v = run(&f, "(match-all (> (get-size) 1))").unwrap();
        assert_eq!(uids(v), vec!["1", "3"]);
        let v = run(&f, r#"(match-all (= (user-tag "label") "L2"))"#).unwrap();
        assert_eq!(uids(v), vec!["2"]);
        let v = run(&f, "(match-all (< (get-sent-date) 1700000002))").unwrap();
        assert_eq!(uids(v), vec!["1"]);
    }

    #[test]
    fn test_non_bool_match_all_operand() {
        let f = folder();
        let err = run(&f, "(match-all (get-size))").unwrap_err();
        assert!(matches!(err, SearchError::Type { .. }), "{err}");
    }

    #[test]
    fn test_unknown_operator() {
        let f = folder();
        let err = run(&f, "(match-all (frobnicate))").unwrap_err();
        assert!(matches!(err, SearchError::UnknownOperator(ref n) if n == "frobnicate"));
    }

    #[test]
    fn test_match_threads_inside_match_all_is_fatal() {
        let f = folder();
        let err = run(&f, r#"(match-all (match-threads "all" (match-all)))"#).unwrap_err();
        assert!(matches!(err, SearchError::Fatal(_)), "{err}");
        let err = run(&f, r#"(match-threads 1 (match-all))"#).unwrap_err();
        assert!(matches!(err, SearchError::Type { .. }), "{err}");
        let err = run(&f, r#"(match-threads "all" #t)"#).unwrap_err();
        assert!(matches!(err, SearchError::Type { .. }), "{err}");
    }

    #[test]
    fn test_forest_built_on_first_thread_match() {
        let f = folder();
        let ctx = SearchContext::new(Some(&f), f.summary(), Cancellable::new());
        let mut eval = Evaluator::new(ctx);
        eval.eval(&parse(r#"(header-contains "subject" "lunch")"#).unwrap(), None)
            .unwrap();
        assert!(!eval.context().has_forest());

        let v = eval
            .eval(&parse(r#"(match-threads "single" (uid "2"))"#).unwrap(), None)
            .unwrap();
        assert_eq!(uids(v), vec!["2"]);
        assert!(eval.context().has_forest());
    }

    #[test]
    fn test_cancelled_match_threads_is_empty() {
        let f = folder();
        let cancel = Cancellable::new();
        cancel.cancel();
        let ctx = SearchContext::new(Some(&f), f.summary(), cancel);
        let mut eval = Evaluator::new(ctx);
        let v = eval
            .eval(&parse(r#"(match-threads "all" (uid "2"))"#).unwrap(), None)
            .unwrap();
        assert!(uids(v).is_empty());
        assert!(!eval.context().has_forest());
    }

    #[test]
    fn test_body_contains_with_and_without_index() {
        let f = folder();
        let v = run(&f, r#"(body-contains "alpha2")"#).unwrap();
        assert_eq!(uids(v), vec!["2"]);

        let index = MemoryIndex::build(&f, &Cancellable::new());
        let ctx = SearchContext::new(Some(&f), f.summary(), Cancellable::new())
            .with_body_index(Some(&index));
        let mut eval = Evaluator::new(ctx);
        let v = eval.eval(&parse(r#"(body-contains "shared alpha3")"#).unwrap(), None).unwrap();
        assert_eq!(uids(v), vec!["3"]);
        let v = eval
            .eval(&parse(r#"(body-contains "message 1:")"#).unwrap(), None)
            .unwrap();
        assert_eq!(uids(v), vec!["1"]);
        let v = eval.eval(&parse(r#"(body-contains "")"#).unwrap(), None).unwrap();
        assert_eq!(uids(v).len(), 3);
    }

    #[test]
    fn test_body_and_header_regex() {
        let f = folder();
        let v = run(&f, r#"(body-regex "alpha[12]\\b")"#).unwrap();
        assert_eq!(uids(v), vec!["1", "2"]);
        let v = run(&f, r#"(header-regex "x-id" "^3$")"#).unwrap();
        assert_eq!(uids(v), vec!["3"]);
        let v = run(&f, r#"(header-full-regex "^subject: lunch")"#).unwrap();
        assert_eq!(uids(v), vec!["2"]);
        let err = run(&f, r#"(body-regex "(")"#).unwrap_err();
        assert!(matches!(err, SearchError::Regex(_)), "{err}");
    }

    #[test]
    fn test_uid_and_location() {
        let f = folder();
        let v = run(&f, r#"(uid "3" "9" "3")"#).unwrap();
        assert_eq!(uids(v), vec!["3"]);
        let v = run(&f, r#"(message-location "memory:inbox")"#).unwrap();
        assert_eq!(uids(v).len(), 3);
        let v = run(&f, r#"(message-location "memory:other")"#).unwrap();
        assert!(uids(v).is_empty());
    }

    #[test]
    fn test_relative_months() {
        assert_eq!(add_months(1_704_067_200, 0), 1_704_067_200);
        // 2024-01-31 plus one month clamps to 2024-02-29.
        assert_eq!(add_months(1_706_659_200, 1), 1_709_164_800);
        assert_eq!(add_months(1_709_164_800, -1), 1_706_486_400);
        let f = folder();
        assert_eq!(run(&f, r#"(get-relative-months "x")"#).unwrap(), Value::Bool(false));
    }

    #[test]
    fn test_not_on_scalars() {
        let f = folder();
        assert_eq!(run(&f, "(not)").unwrap(), Value::Bool(true));
        assert_eq!(run(&f, "(not #t)").unwrap(), Value::Bool(false));
        assert_eq!(run(&f, "(not 5)").unwrap(), Value::Bool(true));
    }
}
