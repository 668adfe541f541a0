use feed_core::{block_user, cascade_delete, is_blocked, unblock_user, DeleteTarget, Viewer};
use feed_db::Database;
use feed_ref::UserId;
use log::{debug, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MenuItem {
    Delete,
    NotInterested,
    /// Block or unblock, depending on the current state.
    ToggleBlock,
    Report,
}

impl MenuItem {
    pub fn action(&self) -> &'static str {
        match self {
            MenuItem::Delete => "delete",
            MenuItem::NotInterested => "not-interested",
            MenuItem::ToggleBlock => "toggle-block",
            MenuItem::Report => "report",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MenuOutcome {
    Stay,
    Redirect(String),
}

/// The "more" menu shown on a post or comment header.
///
/// Authors get a delete entry guarded by a confirmation; everyone else gets
/// block/unblock plus the feedback entries. Failures of the underlying
/// workflows are logged and otherwise leave the menu as it was.
#[derive(Clone, Debug)]
pub struct OptionsMenu {
    viewer: Viewer,
    author_uid: UserId,
    author_name: String,
    target: DeleteTarget,
    author_is_blocked: bool,
    confirm_open: bool,
}

impl OptionsMenu {
    pub async fn load(
        db: &mut Database,
        viewer: &Viewer,
        target: DeleteTarget,
        author_uid: UserId,
        author_name: String,
    ) -> Self {
        let author_is_blocked = if viewer.is(&author_uid) {
            false
        } else {
            is_blocked(db, viewer, &author_uid)
                .await
                .unwrap_or_else(|err| {
                    warn!("Cannot read block state of {}: {}", author_uid, err);
                    false
                })
        };

        Self {
            viewer: viewer.clone(),
            author_uid,
            author_name,
            target,
            author_is_blocked,
            confirm_open: false,
        }
    }

    pub fn is_own(&self) -> bool {
        self.viewer.is(&self.author_uid)
    }

    pub fn author_is_blocked(&self) -> bool {
        self.author_is_blocked
    }

    pub fn confirm_open(&self) -> bool {
        self.confirm_open
    }

    pub fn target(&self) -> &DeleteTarget {
        &self.target
    }

    pub fn items(&self) -> Vec<MenuItem> {
        if self.is_own() {
            vec![MenuItem::Delete]
        } else {
            vec![
                MenuItem::NotInterested,
                MenuItem::ToggleBlock,
                MenuItem::Report,
            ]
        }
    }

    pub fn label(&self, item: MenuItem) -> String {
        match item {
            MenuItem::Delete => match self.target {
                DeleteTarget::Post(_) => "Delete Post".to_string(),
                DeleteTarget::Comment(..) => "Delete Comment".to_string(),
            },
            MenuItem::NotInterested => "Not Interested in This Post".to_string(),
            MenuItem::ToggleBlock if self.author_is_blocked => {
                format!("Unblock {}", self.author_name)
            }
            MenuItem::ToggleBlock => format!("Block {}", self.author_name),
            MenuItem::Report => "Report".to_string(),
        }
    }

    pub fn confirm_prompt(&self) -> &'static str {
        match self.target {
            DeleteTarget::Post(_) => {
                "Are you sure you want to delete your post? It will be gone forever."
            }
            DeleteTarget::Comment(..) => {
                "Are you sure you want to delete your comment? It will be gone forever."
            }
        }
    }

    /// Handles a click on one of [`OptionsMenu::items`].
    pub async fn activate(&mut self, db: &mut Database, item: MenuItem) -> MenuOutcome {
        if !self.items().contains(&item) {
            debug!("{:?} is not offered to {}", item, self.viewer.uid);
            return MenuOutcome::Stay;
        }

        match item {
            MenuItem::Delete => self.confirm_open = true,
            MenuItem::ToggleBlock => self.toggle_block(db).await,
            MenuItem::NotInterested | MenuItem::Report => {
                debug!("{} has no backend action yet", item.action())
            }
        }

        MenuOutcome::Stay
    }

    pub fn cancel_delete(&mut self) {
        self.confirm_open = false;
    }

    /// Runs the cascade delete once confirmed. Redirects to the target's
    /// fallback route on success unless already there.
    pub async fn confirm_delete(&mut self, db: &mut Database, current_route: &str) -> MenuOutcome {
        if !self.confirm_open {
            return MenuOutcome::Stay;
        }
        self.confirm_open = false;

        match cascade_delete(db, &self.viewer, &self.target).await {
            Ok(report) => {
                if !report.blob_failures.is_empty() {
                    warn!(
                        "{} deleted but {} media could not be removed",
                        report.target,
                        report.blob_failures.len()
                    );
                }
                let fallback = self.target.fallback_route();
                if current_route == fallback {
                    MenuOutcome::Stay
                } else {
                    MenuOutcome::Redirect(fallback)
                }
            }
            Err(err) => {
                warn!("Cannot delete {}: {}", self.target.doc_path(), err);
                MenuOutcome::Stay
            }
        }
    }

    async fn toggle_block(&mut self, db: &mut Database) {
        let result = if self.author_is_blocked {
            unblock_user(db, &self.viewer, &self.author_uid).await
        } else {
            block_user(db, &self.viewer, &self.author_uid).await
        };

        match result {
            // Unchanged still means the backend is in the requested state.
            Ok(_) => self.author_is_blocked = !self.author_is_blocked,
            Err(err) => warn!("Cannot change block state of {}: {}", self.author_uid, err),
        }
    }
}
