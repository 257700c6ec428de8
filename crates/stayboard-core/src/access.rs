// ── Role-based visibility ──
//
// Decides which rows a viewer may see. One function, `Viewer::scope`,
// maps a role to an `AccessScope`; both the client-side predicate and
// the server-side fetch filter are derived from that scope so they can
// never disagree.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use stayboard_api::RowFilter;
use tokio::sync::watch;

use crate::model::{Entity, EntityId, EntityKind, Listing, Ownership, UserId};

/// Operator role.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Role {
    SuperAdmin,
    Admin,
    #[default]
    Member,
}

/// Owners whose rows a viewer may see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessScope {
    Everything,
    Owners(HashSet<UserId>),
}

impl AccessScope {
    pub fn admits(&self, owner: &UserId) -> bool {
        match self {
            Self::Everything => true,
            Self::Owners(owners) => owners.contains(owner),
        }
    }
}

// ── ListingDirectory ────────────────────────────────────────────────

/// Listing id to owner, for resolving ownership of child rows.
///
/// Kept current by the listings live view; child views consult it and
/// re-check their rows whenever [`changes`](Self::changes) ticks.
#[derive(Debug)]
pub struct ListingDirectory {
    owners: DashMap<EntityId, UserId>,
    /// Bumped whenever a listing's owner is added, changed or removed.
    revision: watch::Sender<u64>,
}

impl Default for ListingDirectory {
    fn default() -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            owners: DashMap::new(),
            revision,
        }
    }
}

impl ListingDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, listing: &Listing) {
        self.observe(listing);
    }

    /// Record the owner of `entity` if it is a listing. Other kinds are
    /// ignored, so views of any table can feed the directory.
    pub fn observe<T: Entity>(&self, entity: &T) {
        if let (EntityKind::Listing, Ownership::Direct(owner)) = (T::KIND, entity.ownership()) {
            let previous = self.owners.insert(entity.id().clone(), owner.clone());
            if previous.as_ref() != Some(owner) {
                self.bump();
            }
        }
    }

    pub fn forget(&self, listing_id: &EntityId) {
        if self.owners.remove(listing_id).is_some() {
            self.bump();
        }
    }

    /// Ticks after every ownership change.
    pub fn changes(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    fn bump(&self) {
        self.revision.send_modify(|rev| *rev += 1);
    }

    pub fn owner_of(&self, listing_id: &EntityId) -> Option<UserId> {
        self.owners.get(listing_id).map(|r| r.value().clone())
    }

    /// Listings whose owner is admitted by `scope`, sorted for stable
    /// filter rendering.
    pub fn listings_in(&self, scope: &AccessScope) -> Vec<EntityId> {
        let mut ids: Vec<EntityId> = self
            .owners
            .iter()
            .filter(|r| scope.admits(r.value()))
            .map(|r| r.key().clone())
            .collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }
}

// ── Viewer ──────────────────────────────────────────────────────────

/// The operator a live view is rendered for.
#[derive(Debug, Clone)]
pub struct Viewer {
    user: UserId,
    role: Role,
    /// Owners this admin manages. Ignored for other roles.
    managed: HashSet<UserId>,
    listings: Arc<ListingDirectory>,
}

impl Viewer {
    pub fn new(user: UserId, role: Role) -> Self {
        Self {
            user,
            role,
            managed: HashSet::new(),
            listings: Arc::new(ListingDirectory::new()),
        }
    }

    #[must_use]
    pub fn with_managed(mut self, owners: impl IntoIterator<Item = UserId>) -> Self {
        self.managed.extend(owners);
        self
    }

    /// Share a directory with other views of the same operator.
    #[must_use]
    pub fn with_directory(mut self, listings: Arc<ListingDirectory>) -> Self {
        self.listings = listings;
        self
    }

    pub fn user(&self) -> &UserId {
        &self.user
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn directory(&self) -> &Arc<ListingDirectory> {
        &self.listings
    }

    pub fn scope(&self) -> AccessScope {
        match self.role {
            Role::SuperAdmin => AccessScope::Everything,
            Role::Admin => AccessScope::Owners(self.managed.clone()),
            Role::Member => AccessScope::Owners(HashSet::from([self.user.clone()])),
        }
    }

    /// Client-side visibility predicate.
    pub fn can_see<T: Entity>(&self, entity: &T) -> bool {
        let scope = self.scope();
        match entity.ownership() {
            Ownership::Direct(owner) => scope.admits(owner),
            Ownership::ViaListing(listing_id) => match scope {
                AccessScope::Everything => true,
                AccessScope::Owners(_) => self
                    .listings
                    .owner_of(listing_id)
                    .is_some_and(|owner| scope.admits(&owner)),
            },
        }
    }

    /// Server-side filter for the initial fetch of `kind`.
    ///
    /// `None` means fetch everything.
    pub fn fetch_filter(&self, kind: EntityKind) -> Option<RowFilter> {
        let AccessScope::Owners(owners) = self.scope() else {
            return None;
        };

        let values: Vec<String> = match kind {
            EntityKind::Listing => {
                let mut ids: Vec<String> = owners.iter().map(ToString::to_string).collect();
                ids.sort();
                ids
            }
            EntityKind::Guest | EntityKind::QrCode | EntityKind::Device => self
                .listings
                .listings_in(&AccessScope::Owners(owners))
                .iter()
                .map(ToString::to_string)
                .collect(),
        };
        Some(RowFilter::any_of(kind.owner_column(), values))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::Guest;

    fn listing(id: &str, owner: &str) -> Listing {
        Listing {
            id: EntityId::from(id),
            user_id: UserId::from(owner),
            managed_by: None,
            name: id.to_uppercase(),
            address: None,
            city: None,
            timezone: None,
        }
    }

    fn guest(listing_id: &str) -> Guest {
        Guest {
            id: EntityId::from("g1"),
            listing_id: EntityId::from(listing_id),
            first_name: "Ada".into(),
            last_name: None,
            check_in: None,
            check_out: None,
            notes: None,
        }
    }

    #[test]
    fn super_admin_sees_everything_without_filter() {
        let viewer = Viewer::new(UserId::from("root"), Role::SuperAdmin);
        assert!(viewer.can_see(&listing("l1", "anyone")));
        assert!(viewer.can_see(&guest("unknown-listing")));
        assert_eq!(viewer.fetch_filter(EntityKind::Guest), None);
    }

    #[test]
    fn admin_sees_only_managed_owners() {
        let viewer = Viewer::new(UserId::from("admin"), Role::Admin)
            .with_managed([UserId::from("u1"), UserId::from("u2")]);

        assert!(viewer.can_see(&listing("l1", "u1")));
        assert!(!viewer.can_see(&listing("l9", "u9")));
        assert!(!viewer.can_see(&listing("l0", "admin")));

        let filter = viewer.fetch_filter(EntityKind::Listing).unwrap();
        assert_eq!(filter.to_string(), "user_id=in.(u1,u2)");
    }

    #[test]
    fn member_sees_own_rows() {
        let viewer = Viewer::new(UserId::from("u1"), Role::Member);
        assert!(viewer.can_see(&listing("l1", "u1")));
        assert!(!viewer.can_see(&listing("l2", "u2")));
    }

    #[test]
    fn child_rows_resolve_through_directory() {
        let viewer = Viewer::new(UserId::from("u1"), Role::Member);
        let directory = viewer.directory().clone();
        directory.record(&listing("l1", "u1"));
        directory.record(&listing("l2", "u2"));

        assert!(viewer.can_see(&guest("l1")));
        assert!(!viewer.can_see(&guest("l2")));
        assert!(!viewer.can_see(&guest("l3")));

        let filter = viewer.fetch_filter(EntityKind::Guest).unwrap();
        assert_eq!(filter.to_string(), "listing_id=in.(l1)");
    }

    #[test]
    fn directory_tracks_ownership_changes() {
        let viewer = Viewer::new(UserId::from("u1"), Role::Member);
        let directory = viewer.directory().clone();
        directory.record(&listing("l1", "u1"));
        assert!(viewer.can_see(&guest("l1")));

        directory.record(&listing("l1", "u2"));
        assert!(!viewer.can_see(&guest("l1")));

        directory.forget(&EntityId::from("l1"));
        assert!(directory.is_empty());
    }

    #[test]
    fn directory_ticks_only_on_ownership_change() {
        let directory = ListingDirectory::new();
        let mut changes = directory.changes();

        directory.record(&listing("l1", "u1"));
        assert!(changes.has_changed().unwrap());
        changes.borrow_and_update();

        // Same owner again, e.g. a rename.
        directory.record(&listing("l1", "u1"));
        assert!(!changes.has_changed().unwrap());

        directory.record(&listing("l1", "u2"));
        assert!(changes.has_changed().unwrap());
        changes.borrow_and_update();

        directory.forget(&EntityId::from("l9"));
        assert!(!changes.has_changed().unwrap());
        directory.forget(&EntityId::from("l1"));
        assert_eq!(*changes.borrow_and_update(), 3);
    }

    #[test]
    fn role_parses_snake_case() {
        assert_eq!("super_admin".parse::<Role>().unwrap(), Role::SuperAdmin);
        assert_eq!(Role::Admin.to_string(), "admin");
    }
}
