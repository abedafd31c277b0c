//! Folder search: choosing an execution path, evaluating and reconciling.
//!
//! A search runs either in memory, by evaluating the expression against
//! every candidate summary, or is delegated to the folder's summary
//! database as a single SQL query. Delegation is used only when the whole
//! expression translates to SQL and nothing restricts the candidate set.

pub mod body;
pub mod eval;
pub mod header;
pub mod index;
pub mod matcher;
pub mod thread;
pub mod words;

use std::collections::HashSet;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{Result, SearchError};
use crate::model::mail::{Uid, UidPool};
use crate::sexp::{parse, Expr, Value};
use crate::store::folder::Folder;
use crate::store::sql::{quote_identifier, SexpToSql, SqlTranslator};

pub use eval::{Evaluator, Operator, SearchContext};
pub use index::{BodyIndex, MemoryIndex};
pub use thread::{ThreadForest, ThreadMode};
pub use words::Words;

/// Expression used when the caller passes an empty one.
pub const MATCH_ALL: &str = "(match-all)";

/// Operators that always need the in-memory path. Matched as substrings of
/// the expression text.
const IN_MEMORY_ONLY: [&str; 10] = [
    "body-contains",
    "body-regex",
    "match-threads",
    "message-location",
    "header-soundex",
    "header-regex",
    "header-full-regex",
    "header-contains",
    "header-has-words",
    "header-ends-with",
];

/// Cooperative cancellation flag, shared by cloning.
#[derive(Debug, Clone, Default)]
pub struct Cancellable {
    flag: Arc<AtomicBool>,
}

impl Cancellable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// Whether the expression text names an operator the database cannot run.
pub fn requires_in_memory(expr: &str) -> bool {
    IN_MEMORY_ONLY.iter().any(|token| expr.contains(token))
}

/// Searches one folder. Keeps the last parsed expression so repeated
/// searches with the same text skip parsing.
pub struct FolderSearch {
    folder: Option<Rc<dyn Folder>>,
    body_index: Option<Rc<dyn BodyIndex>>,
    translator: Box<dyn SqlTranslator>,
    last_search: Option<String>,
    parsed: Option<Expr>,
    parse_count: usize,
    thread_subject_grouping: bool,
}

impl Default for FolderSearch {
    fn default() -> Self {
        Self::new()
    }
}

impl FolderSearch {
    pub fn new() -> Self {
        Self {
            folder: None,
            body_index: None,
            translator: Box::new(SexpToSql),
            last_search: None,
            parsed: None,
            parse_count: 0,
            thread_subject_grouping: true,
        }
    }

    /// Replace the SQL translator used for delegated searches.
    pub fn with_translator(mut self, translator: Box<dyn SqlTranslator>) -> Self {
        self.translator = translator;
        self
    }

    pub fn set_folder(&mut self, folder: Rc<dyn Folder>) {
        self.folder = Some(folder);
    }

    pub fn folder(&self) -> Option<&Rc<dyn Folder>> {
        self.folder.as_ref()
    }

    pub fn set_body_index(&mut self, index: Option<Rc<dyn BodyIndex>>) {
        self.body_index = index;
    }

    pub fn set_thread_subject_grouping(&mut self, grouping: bool) {
        self.thread_subject_grouping = grouping;
    }

    /// How many times an expression has been parsed.
    pub fn parse_count(&self) -> usize {
        self.parse_count
    }

    /// The SQL query a search for `expr` would run, or `None` when it
    /// would be evaluated in memory.
    pub fn sql_for(&self, expr: &str) -> Option<String> {
        let folder = self.folder.as_deref()?;
        let fragment = self.delegated_fragment(folder, normalize(expr))?;
        Some(select_query("SELECT uid", folder, &fragment))
    }

    /// Identifiers of the messages matching `expr`, in folder order.
    ///
    /// With `uids` the search is limited to those messages and always runs
    /// in memory.
    pub fn search(
        &mut self,
        expr: &str,
        uids: Option<&[Uid]>,
        cancel: &Cancellable,
    ) -> Result<Vec<Uid>> {
        if cancel.is_cancelled() {
            return Err(SearchError::Cancelled);
        }
        let expr = normalize(expr);
        let Some(folder) = self.folder.clone() else {
            warn!("Search without a folder");
            return Ok(Vec::new());
        };

        if uids.is_none() {
            if let Some(fragment) = self.delegated_fragment(&*folder, expr) {
                return select_uids(&*folder, &fragment);
            }
        }

        let summary = folder.summary();
        let candidates: Vec<Uid> = match uids {
            Some(restriction) => {
                let wanted: HashSet<&str> = restriction.iter().map(|u| &**u).collect();
                summary
                    .into_iter()
                    .filter(|u| wanted.contains(&**u))
                    .collect()
            }
            None => {
                folder.prepare_fetch_all();
                summary
            }
        };
        debug!(folder = folder.full_name(), candidates = candidates.len(), "In-memory search");

        let value = self.evaluate(&*folder, expr, candidates.clone(), cancel)?;
        Ok(reconcile(value, &candidates))
    }

    /// Number of messages matching `expr`.
    pub fn count(&mut self, expr: &str, cancel: &Cancellable) -> Result<u32> {
        if cancel.is_cancelled() {
            return Err(SearchError::Cancelled);
        }
        let expr = normalize(expr);
        let Some(folder) = self.folder.clone() else {
            warn!("Count without a folder");
            return Ok(0);
        };

        if let Some(fragment) = self.delegated_fragment(&*folder, expr) {
            return count_rows(&*folder, &fragment);
        }

        folder.prepare_fetch_all();
        let candidates = folder.summary();
        let value = self.evaluate(&*folder, expr, candidates.clone(), cancel)?;
        Ok(reconcile(value, &candidates).len() as u32)
    }

    /// The `WHERE` fragment when the search can be delegated.
    fn delegated_fragment(&self, folder: &dyn Folder, expr: &str) -> Option<String> {
        if folder.is_in_memory_only() || folder.database().is_none() || requires_in_memory(expr) {
            return None;
        }
        let parsed = parse(expr).ok()?;
        self.translator.translate(&parsed)
    }

    fn evaluate(
        &mut self,
        folder: &dyn Folder,
        expr: &str,
        candidates: Vec<Uid>,
        cancel: &Cancellable,
    ) -> Result<Value> {
        if self.last_search.as_deref() != Some(expr) || self.parsed.is_none() {
            let parsed = parse(expr)?;
            self.parsed = Some(parsed);
            self.last_search = Some(expr.to_string());
            self.parse_count += 1;
        }
        let Some(parsed) = self.parsed.as_ref() else {
            return Ok(Value::Uids(Vec::new()));
        };

        let ctx = SearchContext::new(Some(folder), candidates, cancel.clone())
            .with_body_index(self.body_index.as_deref())
            .with_subject_grouping(self.thread_subject_grouping);
        Evaluator::new(ctx)
            .eval(parsed, None)
            .map_err(|e| SearchError::Evaluation {
                expression: expr.to_string(),
                source: Box::new(e),
            })
    }
}

fn normalize(expr: &str) -> &str {
    if expr.trim().is_empty() {
        MATCH_ALL
    } else {
        expr
    }
}

fn select_query(select: &str, folder: &dyn Folder, fragment: &str) -> String {
    let table = quote_identifier(folder.full_name());
    if fragment == "1" {
        format!("{select} FROM {table}")
    } else {
        format!("{select} FROM {table} WHERE {fragment}")
    }
}

fn select_uids(folder: &dyn Folder, fragment: &str) -> Result<Vec<Uid>> {
    let Some(db) = folder.database() else {
        return Ok(Vec::new());
    };
    folder.sync_summary()?;
    let sql = select_query("SELECT uid", folder, fragment);
    debug!(sql = %sql, "Delegated search");

    match db.select_uids(&sql) {
        Ok(rows) => {
            let summary = folder.summary();
            let mut pool = UidPool::with_uids(&summary);
            let found: Vec<Uid> = rows.iter().map(|row| pool.intern(row)).collect();
            Ok(reconcile(Value::Uids(found), &summary))
        }
        Err(SearchError::MissingTable(message)) => {
            debug!(sql = %sql, message = %message, "Summary table missing");
            Ok(Vec::new())
        }
        Err(e) => Err(e),
    }
}

fn count_rows(folder: &dyn Folder, fragment: &str) -> Result<u32> {
    let Some(db) = folder.database() else {
        return Ok(0);
    };
    folder.sync_summary()?;
    let sql = select_query("SELECT COUNT(*)", folder, fragment);
    debug!(sql = %sql, "Delegated count");

    match db.count(&sql) {
        Err(SearchError::MissingTable(message)) => {
            debug!(sql = %sql, message = %message, "Summary table missing");
            Ok(0)
        }
        other => other,
    }
}

/// The candidates present in an array result, in candidate order. Scalar
/// results match nothing.
fn reconcile(value: Value, candidates: &[Uid]) -> Vec<Uid> {
    let Value::Uids(found) = value else {
        return Vec::new();
    };
    let found: HashSet<Uid> = found.into_iter().collect();
    candidates
        .iter()
        .filter(|u| found.contains(*u))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_in_memory() {
        assert!(requires_in_memory(r#"(body-contains "x")"#));
        assert!(requires_in_memory(r#"(match-threads "all" (match-all))"#));
        assert!(!requires_in_memory(r#"(header-matches "subject" "x")"#));
        // Substring match, even inside a string literal.
        assert!(requires_in_memory(r#"(header-matches "subject" "body-regex")"#));
    }

    #[test]
    fn test_reconcile_keeps_candidate_order() {
        let candidates: Vec<Uid> = ["1", "2", "3"].into_iter().map(Uid::from).collect();
        let found = Value::Uids(vec![Uid::from("3"), Uid::from("1"), Uid::from("9"), Uid::from("3")]);
        assert_eq!(reconcile(found, &candidates), vec![Uid::from("1"), Uid::from("3")]);
        assert!(reconcile(Value::Bool(true), &candidates).is_empty());
    }

    #[test]
    fn test_cancellable_is_shared() {
        let a = Cancellable::new();
        let b = a.clone();
        assert!(!b.is_cancelled());
        a.cancel();
        assert!(b.is_cancelled());
    }

    #[test]
    fn test_no_folder() {
        let mut search = FolderSearch::new();
        let cancel = Cancellable::new();
        assert!(search.search("(match-all)", None, &cancel).unwrap().is_empty());
        assert_eq!(search.count("", &cancel).unwrap(), 0);
    }
}
