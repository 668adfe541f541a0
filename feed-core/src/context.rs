use feed_ref::{DocPath, UserId};

/// The signed-in user a workflow acts for.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Viewer {
    pub uid: UserId,
}

impl Viewer {
    pub fn new(uid: UserId) -> Self {
        Self { uid }
    }

    pub fn is(&self, uid: &UserId) -> bool {
        &self.uid == uid
    }

    /// `users/{uid}` of the viewer.
    pub fn record_path(&self) -> DocPath {
        DocPath::User(self.uid.clone())
    }
}
