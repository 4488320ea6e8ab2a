// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Session model: the mirrored page, its history and the tree stack.
//!
//! A tree is a nested flow of pages. While mirroring the desktop, the active
//! tree is always the top of the stack. Opening a sub-flow pushes a new
//! frame after recording the page the buried tree was showing, so returning
//! to it resumes at the right page. Every push carries its own instance id
//! because the same tree can be opened several times in one session.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::event::{NavigationEvent, SessionEvent};
use crate::model::{Page, SessionDescriptor, Tree, TreeFrame};

/// State of the active session, or of none.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Session {
    pub current: Option<SessionDescriptor>,
    /// Page currently shown on the desktop.
    pub display_page: Option<Page>,
    /// Pages displayed so far, oldest first.
    pub page_history: Vec<Page>,
    pub tree_stack: Vec<TreeFrame>,
    /// Every tree seen in this session, by id. First seen wins.
    pub tree_list: BTreeMap<String, Tree>,
    pub card_video_playing: Option<String>,
    /// Set when a shuffle had to walk back first; consumed by the next page.
    pub flag_back_shuffle_event: bool,
}

/// What a shuffle request turned into.
#[derive(Debug, Clone, PartialEq)]
pub enum ShuffleStep {
    /// The page on screen can be shuffled right away.
    Ready(Page),
    /// No page is on screen: walk back first, shuffle when it shows up.
    BackFirst(NavigationEvent),
    /// Nothing to shuffle.
    Nothing,
}

impl Session {
    /// Replaces the session wholesale. `None` tears it down.
    pub fn new_session(&mut self, current: Option<SessionDescriptor>) {
        *self = Session {
            current,
            ..Session::default()
        };
    }

    /// Updates the descriptor without touching the rest of the state.
    pub fn set_current(&mut self, current: Option<SessionDescriptor>) {
        self.current = current;
    }

    pub fn is_active(&self) -> bool {
        self.current.is_some()
    }

    pub fn top(&self) -> Option<&TreeFrame> {
        self.tree_stack.last()
    }

    /// Sets the displayed page, linking it to the tree on top of the stack.
    ///
    /// `None` clears the display and leaves the history alone. A page only
    /// enters the history while a session is active.
    pub fn set_display_page(&mut self, page: Option<Page>) {
        let Some(mut page) = page else {
            self.display_page = None;
            return;
        };

        match self.tree_stack.last() {
            Some(frame) => {
                page.tree_id = Some(frame.tree_id.clone());
                page.tree_uid = Some(frame.uid.clone());
            }
            None => {
                warn!(page_id = %page.id, "displaying page with an empty tree stack");
            }
        }

        if self.is_active() {
            self.page_history.push(page.clone());
        }
        self.display_page = Some(page);
    }

    /// Shows a page pushed by the desktop, hiding labels in cognitive sessions.
    pub fn show_page(&mut self, page: Option<Page>) {
        let cognitive = self
            .current
            .as_ref()
            .is_some_and(SessionDescriptor::is_cognitive);
        self.set_display_page(page.map(|mut p| {
            if cognitive {
                p.labels_hidden = true;
            }
            p
        }));
    }

    /// Pushes a tree on the stack and returns the instance id it got.
    ///
    /// `prev_page` is recorded on the frame being buried. `uid` restores a
    /// known instance id; a fresh one is generated otherwise.
    pub fn push_tree(&mut self, tree: Tree, prev_page: Option<&Page>, uid: Option<String>) -> String {
        if let (Some(prev), Some(top)) = (prev_page, self.tree_stack.last_mut()) {
            top.last_shown_page_id = Some(prev.id.clone());
        }

        let uid = uid.unwrap_or_else(|| Uuid::new_v4().simple().to_string());
        self.tree_stack.push(TreeFrame {
            tree_id: tree.id.clone(),
            uid: uid.clone(),
            last_shown_page_id: None,
        });
        self.tree_list.entry(tree.id.clone()).or_insert(tree);
        debug!(depth = self.tree_stack.len(), %uid, "tree pushed");
        uid
    }

    /// Pushes the tree a session starts with, before its first page arrives.
    pub fn load_tree(&mut self, tree: Tree) -> String {
        self.push_tree(tree, None, None)
    }

    /// Opens a sub-flow on top of the running tree.
    ///
    /// The page on screen is recorded on the buried frame so that
    /// `NO_MORE_PAGES` in the sub-flow resumes there.
    pub fn add_tree(&mut self, tree: Tree) -> String {
        let shown = self.display_page.clone();
        self.push_tree(tree, shown.as_ref(), None)
    }

    /// Removes the frame pushed with `uid`, wherever it sits on the stack.
    pub fn remove_tree(&mut self, uid: &str) -> bool {
        match self.tree_stack.iter().rposition(|frame| frame.uid == uid) {
            Some(index) => {
                self.tree_stack.remove(index);
                true
            }
            None => false,
        }
    }

    /// Removes the top `n` frames; saturates at empty.
    pub fn pop_trees(&mut self, n: usize) {
        let len = self.tree_stack.len().saturating_sub(n);
        self.tree_stack.truncate(len);
    }

    /// Drops the last `n` history entries; saturates at empty.
    pub fn go_back_history(&mut self, n: usize) {
        let len = self.page_history.len().saturating_sub(n);
        self.page_history.truncate(len);
    }

    pub fn clear_history(&mut self) {
        self.page_history.clear();
    }

    pub fn set_card_video_playing(&mut self, card_id: Option<String>) {
        self.card_video_playing = card_id;
    }

    pub fn set_flag_back_shuffle_event(&mut self, flag: bool) {
        self.flag_back_shuffle_event = flag;
    }

    /// Clears the shuffle flag, returning whether it was set.
    pub fn take_shuffle_flag(&mut self) -> bool {
        std::mem::take(&mut self.flag_back_shuffle_event)
    }

    fn navigation(&self, event: SessionEvent) -> NavigationEvent {
        NavigationEvent {
            event,
            session: self.current.clone(),
            page: self.display_page.clone(),
        }
    }

    /// The top tree has no more pages.
    ///
    /// Returns to the parent tree at its last shown page, or ends the session
    /// when the root tree is exhausted.
    pub fn on_no_more_pages(&mut self) -> Option<NavigationEvent> {
        if self.tree_stack.len() > 1 {
            let resume = self.tree_stack[self.tree_stack.len() - 2]
                .last_shown_page_id
                .clone();
            let nav = self.navigation(SessionEvent::JumpToPage {
                next_page_id: resume,
            });
            self.pop_trees(1);
            return Some(nav);
        }

        let nav = self
            .is_active()
            .then(|| self.navigation(SessionEvent::TransitionToEnd {}));
        self.pop_trees(1);
        nav
    }

    /// Walks back to the previous page of the history.
    ///
    /// The server answers a back event with a `SHOW_PAGE` that appends the
    /// target again, so the target itself is removed from the history too.
    pub fn navigate_back(&mut self) -> Option<NavigationEvent> {
        let len = self.page_history.len();
        let displayed = self.display_page.is_some();
        if !self.is_active() || len == 0 || (displayed && len == 1) {
            return None;
        }

        let target = if displayed { len - 2 } else { len - 1 };
        let next_page = self.page_history[target].clone();
        let nav = self.navigation(SessionEvent::Back {
            next_page_id: Some(next_page.id.clone()),
        });
        self.go_back_history(if displayed { 2 } else { 1 });
        self.realign_stack(&next_page);
        Some(nav)
    }

    /// Makes the tree holding `next_page` the top of the stack again.
    fn realign_stack(&mut self, next_page: &Page) {
        let at_root_level = self
            .display_page
            .as_ref()
            .is_some_and(|p| p.level == 0)
            && self.tree_stack.len() > 1;
        let same_instance = self
            .tree_stack
            .last()
            .is_some_and(|top| Some(&top.uid) == next_page.tree_uid.as_ref());
        if same_instance && !at_root_level {
            return;
        }

        let len = self.tree_stack.len();
        if len > 1 && Some(&self.tree_stack[len - 2].tree_id) == next_page.tree_id.as_ref() {
            self.pop_trees(1);
            return;
        }

        let tree = next_page
            .tree_id
            .as_ref()
            .and_then(|id| self.tree_list.get(id))
            .cloned();
        match tree {
            Some(tree) => {
                let prev = self.display_page.clone();
                self.push_tree(tree, prev.as_ref(), next_page.tree_uid.clone());
            }
            None => warn!(page_id = %next_page.id, "back target belongs to an unknown tree"),
        }
    }

    /// Prepares a shuffle of the displayed page.
    ///
    /// When the session has reached its end screen, the last page is brought
    /// back first and the shuffle happens once it is displayed again.
    pub fn request_shuffle(&mut self) -> ShuffleStep {
        if let Some(page) = &self.display_page {
            return ShuffleStep::Ready(page.clone());
        }
        if !self.is_active() || self.page_history.is_empty() {
            return ShuffleStep::Nothing;
        }

        self.set_flag_back_shuffle_event(true);
        match self.navigate_back() {
            Some(nav) => ShuffleStep::BackFirst(nav),
            None => {
                self.set_flag_back_shuffle_event(false);
                ShuffleStep::Nothing
            }
        }
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
