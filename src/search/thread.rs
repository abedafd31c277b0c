//! Conversation threads and thread-based result expansion.
//!
//! Messages are linked by `Message-ID`, `In-Reply-To` and `References`
//! (JWZ style, <https://www.jwz.org/doc/threading.html>) into a forest held
//! in an index arena. `match-threads` then widens a result set along it.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::debug;

use crate::model::mail::{MessageInfo, Uid};
use crate::search::Cancellable;

/// How `match-threads` widens a result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadMode {
    /// Results unchanged.
    None,
    /// Every message of each matching thread.
    All,
    /// Each match plus its replies, recursively.
    Replies,
    /// Each match plus the messages it replies to.
    RepliesParents,
    /// Matches that are alone in their thread.
    Single,
}

impl ThreadMode {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "none" => Some(Self::None),
            "all" => Some(Self::All),
            "replies" => Some(Self::Replies),
            "replies_parents" => Some(Self::RepliesParents),
            "single" => Some(Self::Single),
            _ => None,
        }
    }
}

#[derive(Debug)]
struct Node {
    /// `None` for a placeholder whose message is not in the folder.
    uid: Option<Uid>,
    parent: Option<usize>,
    first_child: Option<usize>,
    last_child: Option<usize>,
    next_sibling: Option<usize>,
}

/// Thread structure over a set of messages.
#[derive(Debug, Default)]
pub struct ThreadForest {
    nodes: Vec<Node>,
    by_uid: HashMap<Uid, usize>,
}

/// Link state of one Message-ID while threading.
#[derive(Debug, Default)]
struct Container {
    info: Option<usize>,
    parent: Option<String>,
    children: Vec<String>,
}

impl ThreadForest {
    /// Thread `infos`. With `subject_grouping`, a root whose subject is a
    /// reply (`Re:`, `Fwd:`) joins an earlier root with the same subject.
    pub fn build(infos: &[Arc<MessageInfo>], subject_grouping: bool) -> Self {
        let mut containers: HashMap<String, Container> = HashMap::new();
        let mut order: Vec<String> = Vec::new();

        let mut touch = |containers: &mut HashMap<String, Container>, id: &str| {
            if !containers.contains_key(id) {
                containers.insert(id.to_string(), Container::default());
                order.push(id.to_string());
            }
        };

        for (idx, info) in infos.iter().enumerate() {
            let mut mid = normalize_id(&info.message_id);
            if mid.is_empty() || containers.get(&mid).is_some_and(|c| c.info.is_some()) {
                // Missing or duplicate ids get a private container.
                mid = format!("\0{}", info.uid);
            }
            touch(&mut containers, &mid);
            if let Some(c) = containers.get_mut(&mid) {
                c.info = Some(idx);
            }

            let mut chain: Vec<String> = info
                .references
                .iter()
                .map(|r| normalize_id(r))
                .filter(|r| !r.is_empty())
                .collect();
            if let Some(reply_to) = &info.in_reply_to {
                let id = normalize_id(reply_to);
                if !id.is_empty() && !chain.contains(&id) {
                    chain.push(id);
                }
            }
            for id in &chain {
                touch(&mut containers, id);
            }
            chain.push(mid);

            for pair in chain.windows(2) {
                link(&mut containers, &pair[0], &pair[1]);
            }
        }

        let mut forest = ThreadForest::default();
        for id in &order {
            if containers.get(id).is_some_and(|c| c.parent.is_none()) {
                forest.place(id, None, &containers, infos);
            }
        }

        if subject_grouping {
            forest.group_by_subject(infos);
        }
        debug!(messages = infos.len(), nodes = forest.nodes.len(), "Thread forest built");
        forest
    }

    /// Add container `id` and its subtree under `parent`. Placeholders are
    /// dropped and their children promoted, except at the root when they
    /// hold a thread of several branches together.
    fn place(
        &mut self,
        id: &str,
        parent: Option<usize>,
        containers: &HashMap<String, Container>,
        infos: &[Arc<MessageInfo>],
    ) {
        // Explicit stack: reply chains can be arbitrarily deep.
        let mut stack: Vec<(&str, Option<usize>)> = vec![(id, parent)];
        while let Some((id, parent)) = stack.pop() {
            let Some(container) = containers.get(id) else {
                continue;
            };
            let here = match container.info {
                Some(i) => Some(self.push(Some(infos[i].uid.clone()), parent)),
                None if parent.is_none() => {
                    let branches = container
                        .children
                        .iter()
                        .filter(|c| has_message(c, containers))
                        .count();
                    if branches > 1 {
                        Some(self.push(None, None))
                    } else {
                        None
                    }
                }
                None => None,
            };
            let child_parent = here.or(parent);
            stack.extend(
                container
                    .children
                    .iter()
                    .rev()
                    .map(|child| (child.as_str(), child_parent)),
            );
        }
    }

    fn push(&mut self, uid: Option<Uid>, parent: Option<usize>) -> usize {
        let idx = self.nodes.len();
        if let Some(uid) = &uid {
            self.by_uid.insert(uid.clone(), idx);
        }
        self.nodes.push(Node {
            uid,
            parent: None,
            first_child: None,
            last_child: None,
            next_sibling: None,
        });
        if let Some(parent) = parent {
            self.attach(idx, parent);
        }
        idx
    }

    fn attach(&mut self, child: usize, parent: usize) {
        self.nodes[child].parent = Some(parent);
        match self.nodes[parent].last_child {
            Some(last) => self.nodes[last].next_sibling = Some(child),
            None => self.nodes[parent].first_child = Some(child),
        }
        self.nodes[parent].last_child = Some(child);
    }

    fn group_by_subject(&mut self, infos: &[Arc<MessageInfo>]) {
        let subjects: HashMap<&str, &str> = infos
            .iter()
            .map(|i| (&*i.uid, i.subject.as_str()))
            .collect();
        let mut first_root: HashMap<String, usize> = HashMap::new();

        for idx in 0..self.nodes.len() {
            if self.nodes[idx].parent.is_some() {
                continue;
            }
            let Some(subject) = self.nodes[idx]
                .uid
                .as_deref()
                .and_then(|uid| subjects.get(uid))
            else {
                continue;
            };
            let key = normalize_subject(subject);
            if key.is_empty() {
                continue;
            }
            match first_root.get(&key) {
                Some(&root) if is_reply(subject) => self.attach(idx, root),
                Some(_) => {}
                None => {
                    first_root.insert(key, idx);
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.by_uid.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_uid.is_empty()
    }

    /// Whether the message has neither a parent nor replies.
    pub fn is_single(&self, uid: &str) -> bool {
        self.by_uid
            .get(uid)
            .is_some_and(|&i| self.nodes[i].parent.is_none() && self.nodes[i].first_child.is_none())
    }

    /// Widen `uids` along the threads. The output holds no duplicates, and
    /// uids the forest does not know are passed through. Cancellation stops
    /// the walk and returns what was collected.
    pub fn expand(&self, uids: &[Uid], mode: ThreadMode, cancel: &Cancellable) -> Vec<Uid> {
        if mode == ThreadMode::None {
            return uids.to_vec();
        }

        let mut seen: HashSet<Uid> = HashSet::new();
        let mut out: Vec<Uid> = Vec::new();
        let mut emit = |uid: &Uid| {
            if seen.insert(uid.clone()) {
                out.push(uid.clone());
            }
        };

        for uid in uids {
            if cancel.is_cancelled() {
                break;
            }
            let Some(&idx) = self.by_uid.get(uid) else {
                // Unthreaded matches still count, except as singles.
                if mode != ThreadMode::Single {
                    emit(uid);
                }
                continue;
            };
            match mode {
                ThreadMode::None => {}
                ThreadMode::All => {
                    let mut root = idx;
                    while let Some(parent) = self.nodes[root].parent {
                        root = parent;
                    }
                    self.subtree(root, &mut emit);
                }
                ThreadMode::Replies => self.subtree(idx, &mut emit),
                ThreadMode::RepliesParents => {
                    let mut ancestors = Vec::new();
                    let mut cur = self.nodes[idx].parent;
                    while let Some(parent) = cur {
                        ancestors.push(parent);
                        cur = self.nodes[parent].parent;
                    }
                    for &a in ancestors.iter().rev() {
                        if let Some(uid) = &self.nodes[a].uid {
                            emit(uid);
                        }
                    }
                    emit(uid);
                }
                ThreadMode::Single => {
                    if self.is_single(uid) {
                        emit(uid);
                    }
                }
            }
        }
        out
    }

    /// Pre-order walk of the subtree rooted at `idx`.
    fn subtree(&self, idx: usize, emit: &mut dyn FnMut(&Uid)) {
        let mut stack = vec![idx];
        while let Some(i) = stack.pop() {
            let node = &self.nodes[i];
            if let Some(uid) = &node.uid {
                emit(uid);
            }
            let mut children = Vec::new();
            let mut child = node.first_child;
            while let Some(c) = child {
                children.push(c);
                child = self.nodes[c].next_sibling;
            }
            stack.extend(children.into_iter().rev());
        }
    }
}

/// Make `parent_id` the parent of `child_id` unless that closes a cycle.
fn link(containers: &mut HashMap<String, Container>, parent_id: &str, child_id: &str) {
    if parent_id == child_id || would_create_cycle(containers, parent_id, child_id) {
        return;
    }
    if let Some(old) = containers.get(child_id).and_then(|c| c.parent.clone()) {
        if old == parent_id {
            return;
        }
        if let Some(old_parent) = containers.get_mut(&old) {
            old_parent.children.retain(|c| c != child_id);
        }
    }
    if let Some(child) = containers.get_mut(child_id) {
        child.parent = Some(parent_id.to_string());
    }
    if let Some(parent) = containers.get_mut(parent_id) {
        parent.children.push(child_id.to_string());
    }
}

fn would_create_cycle(
    containers: &HashMap<String, Container>,
    parent_id: &str,
    child_id: &str,
) -> bool {
    let mut current = Some(parent_id);
    while let Some(id) = current {
        if id == child_id {
            return true;
        }
        current = containers.get(id).and_then(|c| c.parent.as_deref());
    }
    false
}

/// Whether the subtree under `id` holds at least one real message.
fn has_message(id: &str, containers: &HashMap<String, Container>) -> bool {
    let mut stack = vec![id];
    while let Some(id) = stack.pop() {
        let Some(container) = containers.get(id) else {
            continue;
        };
        if container.info.is_some() {
            return true;
        }
        stack.extend(container.children.iter().map(String::as_str));
    }
    false
}

/// Strip angle brackets and whitespace from a Message-ID.
fn normalize_id(id: &str) -> String {
    id.trim()
        .trim_start_matches('<')
        .trim_end_matches('>')
        .trim()
        .to_string()
}

const REPLY_PREFIXES: [&str; 3] = ["re:", "fwd:", "fw:"];

fn is_reply(subject: &str) -> bool {
    let lower = subject.trim().to_lowercase();
    REPLY_PREFIXES.iter().any(|p| lower.starts_with(p))
}

/// Lower-cased subject without any `Re:`/`Fwd:` prefixes.
fn normalize_subject(subject: &str) -> String {
    let mut s = subject.trim().to_lowercase();
    while let Some(prefix) = REPLY_PREFIXES.iter().find(|p| s.starts_with(*p)) {
        s = s[prefix.len()..].trim_start().to_string();
    }
    s
}
