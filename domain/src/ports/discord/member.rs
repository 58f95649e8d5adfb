use domain_shared::discord::UserId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub user_id: UserId,
    pub username: String,
    pub discriminator: Option<u16>,
}

impl Member {
    /// The `name#discriminator` form used by roster files.
    ///
    /// Accounts on the new username system have no discriminator and are
    /// reported by Discord as `#0`.
    pub fn handle(&self) -> String {
        match self.discriminator {
            Some(discriminator) => format!("{}#{:04}", self.username, discriminator),
            None => format!("{}#0", self.username),
        }
    }
}
