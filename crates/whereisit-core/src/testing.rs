//! In-memory port fakes for use-case tests

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, oneshot, watch};

use crate::domain::{
    BackendUserId, Email, Item, ItemDraft, ItemId, ItemStatus, NewProfile, Party, PostType,
    RecoveryId, RecoveryRecord, RecoveryRequest, Role, SubjectId, UserProfile,
};
use crate::ports::{
    CachedCopy, CredentialError, GatewayError, ICredentialProvider, IItemCache, ISessionGateway,
    Identity, IdentityEvent, IdentityToken, ListQuery, QuerySource,
};

// ============================================================================
// Builders
// ============================================================================

pub fn item(id: &str, status: ItemStatus, owner: &str) -> Item {
    Item {
        id: ItemId::new(id).unwrap(),
        post_type: PostType::Found,
        status,
        owner_email: Email::new(owner).unwrap(),
        title: format!("Item {id}"),
        location: "Library".to_string(),
        date: None,
        description: String::new(),
        category: String::new(),
        thumbnail: None,
        contact_name: String::new(),
    }
}

pub fn profile(email: &str, name: &str) -> UserProfile {
    let local = email.split('@').next().unwrap();
    UserProfile {
        subject_id: SubjectId::new(format!("sub-{local}")).unwrap(),
        email: Email::new(email).unwrap(),
        display_name: name.to_string(),
        role: Role::User,
        backend_id: BackendUserId::new(format!("u-{local}-{name}")).unwrap(),
        photo_url: None,
    }
}

pub fn identity(email: &str) -> Identity {
    let local = email.split('@').next().unwrap();
    Identity {
        subject_id: SubjectId::new(format!("sub-{local}")).unwrap(),
        email: Email::new(email).unwrap(),
        display_name: None,
        token: IdentityToken {
            value: format!("token-{local}"),
            expires_at: Utc::now() + chrono::Duration::hours(1),
        },
    }
}

pub fn record(id: &str, item_id: &str, owner: &str, finder: &str) -> RecoveryRecord {
    let party = |email: &str| Party {
        user_id: None,
        name: None,
        email: Email::new(email).unwrap(),
    };
    RecoveryRecord {
        id: RecoveryId::new(id).unwrap(),
        item_id: ItemId::new(item_id).unwrap(),
        recovered_location: "Library".to_string(),
        recovered_date: None,
        notes: None,
        recovered_by: Some(party(finder)),
        original_owner: Some(party(owner)),
        original_post_type: None,
        original_item_data: None,
        recovery_status: "completed".to_string(),
        created_at: None,
    }
}

/// Polls `condition` until it holds, failing the test after one second
pub async fn eventually(condition: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(1), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

// ============================================================================
// FakeCredentialProvider
// ============================================================================

pub struct FakeCredentialProvider {
    events: broadcast::Sender<IdentityEvent>,
    publish_sign_ins: AtomicBool,
    auth_error: Mutex<Option<CredentialError>>,
    create_error: Mutex<Option<CredentialError>>,
    token_errors: Mutex<VecDeque<CredentialError>>,
    sign_out_error: Mutex<Option<CredentialError>>,
    restorable: Mutex<Option<Identity>>,
    pub create_calls: AtomicUsize,
    pub auth_calls: AtomicUsize,
    pub profile_updates: Mutex<Vec<NewProfile>>,
    pub sign_out_calls: AtomicUsize,
}

impl FakeCredentialProvider {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            events,
            publish_sign_ins: AtomicBool::new(false),
            auth_error: Mutex::new(None),
            create_error: Mutex::new(None),
            token_errors: Mutex::new(VecDeque::new()),
            sign_out_error: Mutex::new(None),
            restorable: Mutex::new(None),
            create_calls: AtomicUsize::new(0),
            auth_calls: AtomicUsize::new(0),
            profile_updates: Mutex::new(Vec::new()),
            sign_out_calls: AtomicUsize::new(0),
        }
    }

    pub fn emit(&self, event: IdentityEvent) {
        let _ = self.events.send(event);
    }

    pub fn publish_sign_ins(&self) {
        self.publish_sign_ins.store(true, Ordering::SeqCst);
    }

    pub fn fail_authentication(&self, err: CredentialError) {
        *self.auth_error.lock().unwrap() = Some(err);
    }

    pub fn fail_creation(&self, err: CredentialError) {
        *self.create_error.lock().unwrap() = Some(err);
    }

    pub fn fail_next_token(&self, err: CredentialError) {
        self.token_errors.lock().unwrap().push_back(err);
    }

    pub fn fail_sign_out(&self, err: CredentialError) {
        *self.sign_out_error.lock().unwrap() = Some(err);
    }

    pub fn set_restorable(&self, identity: Identity) {
        *self.restorable.lock().unwrap() = Some(identity);
    }
}

#[async_trait::async_trait]
impl ICredentialProvider for FakeCredentialProvider {
    async fn create_identity(
        &self,
        email: &Email,
        _password: &str,
    ) -> Result<Identity, CredentialError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.create_error.lock().unwrap().take() {
            return Err(err);
        }
        Ok(identity(email.as_str()))
    }

    async fn update_profile(
        &self,
        identity: &Identity,
        profile: &NewProfile,
    ) -> Result<Identity, CredentialError> {
        self.profile_updates.lock().unwrap().push(profile.clone());
        let mut updated = identity.clone();
        updated.display_name = Some(profile.display_name.clone());
        Ok(updated)
    }

    async fn authenticate(
        &self,
        email: &Email,
        _password: &str,
    ) -> Result<Identity, CredentialError> {
        self.auth_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.auth_error.lock().unwrap().take() {
            return Err(err);
        }
        let identity = identity(email.as_str());
        if self.publish_sign_ins.load(Ordering::SeqCst) {
            self.emit(IdentityEvent::SignedIn(identity.clone()));
        }
        Ok(identity)
    }

    async fn authenticate_via_provider(&self) -> Result<Identity, CredentialError> {
        self.authenticate(&Email::new("provider@x.com").unwrap(), "")
            .await
    }

    async fn sign_out(&self) -> Result<(), CredentialError> {
        self.sign_out_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.sign_out_error.lock().unwrap().clone() {
            return Err(err);
        }
        self.emit(IdentityEvent::SignedOut);
        Ok(())
    }

    async fn get_token(&self, identity: &Identity) -> Result<IdentityToken, CredentialError> {
        if let Some(err) = self.token_errors.lock().unwrap().pop_front() {
            return Err(err);
        }
        Ok(identity.token.clone())
    }

    async fn restore(&self) -> Result<Option<Identity>, CredentialError> {
        Ok(self.restorable.lock().unwrap().clone())
    }

    fn subscribe(&self) -> broadcast::Receiver<IdentityEvent> {
        self.events.subscribe()
    }
}

// ============================================================================
// FakeGateway
// ============================================================================

struct LoginStep {
    release: Option<oneshot::Receiver<()>>,
    result: Result<UserProfile, GatewayError>,
}

pub struct FakeGateway {
    default_profile: Mutex<Option<UserProfile>>,
    login_script: Mutex<VecDeque<LoginStep>>,
    logout_error: Mutex<Option<GatewayError>>,
    items: Mutex<HashMap<ItemId, Item>>,
    get_item_errors: Mutex<VecDeque<GatewayError>>,
    get_item_gate: Mutex<Option<oneshot::Receiver<()>>>,
    recovery_errors: Mutex<VecDeque<GatewayError>>,
    recoveries: Mutex<Vec<RecoveryRecord>>,
    write_errors: Mutex<VecDeque<GatewayError>>,
    created: Mutex<Vec<ItemDraft>>,
    pub login_calls: AtomicUsize,
    pub login_names: Mutex<Vec<Option<String>>>,
    pub logout_calls: AtomicUsize,
    pub get_item_calls: AtomicUsize,
    pub list_calls: AtomicUsize,
    pub recover_calls: AtomicUsize,
    pub write_calls: AtomicUsize,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self {
            default_profile: Mutex::new(None),
            login_script: Mutex::new(VecDeque::new()),
            logout_error: Mutex::new(None),
            items: Mutex::new(HashMap::new()),
            get_item_errors: Mutex::new(VecDeque::new()),
            get_item_gate: Mutex::new(None),
            recovery_errors: Mutex::new(VecDeque::new()),
            recoveries: Mutex::new(Vec::new()),
            write_errors: Mutex::new(VecDeque::new()),
            created: Mutex::new(Vec::new()),
            login_calls: AtomicUsize::new(0),
            login_names: Mutex::new(Vec::new()),
            logout_calls: AtomicUsize::new(0),
            get_item_calls: AtomicUsize::new(0),
            list_calls: AtomicUsize::new(0),
            recover_calls: AtomicUsize::new(0),
            write_calls: AtomicUsize::new(0),
        }
    }

    pub fn set_default_profile(&self, profile: UserProfile) {
        *self.default_profile.lock().unwrap() = Some(profile);
    }

    /// Queues a login answer that is returned immediately
    pub fn script_login(&self, result: Result<UserProfile, GatewayError>) {
        self.login_script.lock().unwrap().push_back(LoginStep {
            release: None,
            result,
        });
    }

    /// Queues a login answer held back until the returned sender fires
    pub fn script_gated_login(
        &self,
        result: Result<UserProfile, GatewayError>,
    ) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.login_script.lock().unwrap().push_back(LoginStep {
            release: Some(rx),
            result,
        });
        tx
    }

    pub fn fail_logout(&self, err: GatewayError) {
        *self.logout_error.lock().unwrap() = Some(err);
    }

    pub fn put_item(&self, item: Item) {
        self.items.lock().unwrap().insert(item.id.clone(), item);
    }

    pub fn fail_next_get_item(&self, err: GatewayError) {
        self.get_item_errors.lock().unwrap().push_back(err);
    }

    /// Holds the next item read back until the returned sender fires
    pub fn gate_next_get_item(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        *self.get_item_gate.lock().unwrap() = Some(rx);
        tx
    }

    pub fn fail_next_recovery(&self, err: GatewayError) {
        self.recovery_errors.lock().unwrap().push_back(err);
    }

    pub fn push_recovery(&self, record: RecoveryRecord) {
        self.recoveries.lock().unwrap().push(record);
    }

    /// Fails the next create, update or delete
    pub fn fail_next_write(&self, err: GatewayError) {
        self.write_errors.lock().unwrap().push_back(err);
    }

    pub fn created_drafts(&self) -> Vec<ItemDraft> {
        self.created.lock().unwrap().clone()
    }

    fn begin_write(&self) -> Result<(), GatewayError> {
        self.write_calls.fetch_add(1, Ordering::SeqCst);
        match self.write_errors.lock().unwrap().pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

fn apply_draft(item: &mut Item, draft: &ItemDraft) {
    item.post_type = draft.post_type;
    item.title = draft.title.clone();
    item.description = draft.description.clone();
    item.category = draft.category.clone();
    item.location = draft.location.clone();
    item.date = Some(draft.date);
    item.thumbnail = Some(draft.thumbnail.clone());
    item.contact_name = draft.contact_name.clone();
    item.owner_email = draft.contact_email.clone();
}

#[async_trait::async_trait]
impl ISessionGateway for FakeGateway {
    async fn session_login(
        &self,
        _token: &IdentityToken,
        name: Option<&str>,
    ) -> Result<UserProfile, GatewayError> {
        self.login_calls.fetch_add(1, Ordering::SeqCst);
        self.login_names
            .lock()
            .unwrap()
            .push(name.map(str::to_string));

        let step = self.login_script.lock().unwrap().pop_front();
        match step {
            Some(step) => {
                if let Some(release) = step.release {
                    let _ = release.await;
                }
                step.result
            }
            None => self
                .default_profile
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(|| GatewayError::InvalidResponse("no profile scripted".into())),
        }
    }

    async fn logout(&self) -> Result<(), GatewayError> {
        self.logout_calls.fetch_add(1, Ordering::SeqCst);
        match self.logout_error.lock().unwrap().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn get_item(&self, id: &ItemId) -> Result<Item, GatewayError> {
        self.get_item_calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.get_item_gate.lock().unwrap().take();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        if let Some(err) = self.get_item_errors.lock().unwrap().pop_front() {
            return Err(err);
        }
        self.items
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound(format!("item {id}")))
    }

    async fn list_items(&self) -> Result<Vec<Item>, GatewayError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let mut items: Vec<Item> = self.items.lock().unwrap().values().cloned().collect();
        items.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(items)
    }

    async fn list_my_items(&self) -> Result<Vec<Item>, GatewayError> {
        let owner = self
            .default_profile
            .lock()
            .unwrap()
            .as_ref()
            .map(|profile| profile.email.clone())
            .ok_or_else(|| GatewayError::Unauthorized("no session".into()))?;
        let mut items: Vec<Item> = self
            .items
            .lock()
            .unwrap()
            .values()
            .filter(|item| item.is_owned_by(&owner))
            .cloned()
            .collect();
        items.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(items)
    }

    async fn create_item(&self, draft: &ItemDraft) -> Result<ItemId, GatewayError> {
        self.begin_write()?;
        let mut created = self.created.lock().unwrap();
        created.push(draft.clone());
        let id = ItemId::new(format!("new-{}", created.len())).unwrap();

        let mut posted = item(id.as_str(), ItemStatus::Active, draft.contact_email.as_str());
        apply_draft(&mut posted, draft);
        self.put_item(posted);
        Ok(id)
    }

    async fn update_item(&self, id: &ItemId, draft: &ItemDraft) -> Result<(), GatewayError> {
        self.begin_write()?;
        let mut items = self.items.lock().unwrap();
        let existing = items
            .get_mut(id)
            .ok_or_else(|| GatewayError::NotFound("Item not found".into()))?;
        apply_draft(existing, draft);
        Ok(())
    }

    async fn delete_item(&self, id: &ItemId) -> Result<(), GatewayError> {
        self.begin_write()?;
        self.items
            .lock()
            .unwrap()
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| GatewayError::NotFound("Item not found".into()))
    }

    async fn recover_item(
        &self,
        request: &RecoveryRequest,
    ) -> Result<RecoveryRecord, GatewayError> {
        self.recover_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.recovery_errors.lock().unwrap().pop_front() {
            return Err(err);
        }

        let mut items = self.items.lock().unwrap();
        let item = items
            .get_mut(request.item_id())
            .ok_or_else(|| GatewayError::NotFound("Item not found".into()))?;
        if item.is_recovered() {
            return Err(GatewayError::Conflict("Item already recovered".into()));
        }
        item.status = ItemStatus::Recovered;

        let record = record(
            &format!("rec-{}", item.id),
            item.id.as_str(),
            item.owner_email.as_str(),
            "claimant@x.com",
        );
        self.recoveries.lock().unwrap().push(record.clone());
        Ok(record)
    }

    async fn list_recoveries(&self) -> Result<Vec<RecoveryRecord>, GatewayError> {
        Ok(self.recoveries.lock().unwrap().clone())
    }
}

// ============================================================================
// MapItemCache
// ============================================================================

struct MapList {
    ids: Vec<ItemId>,
    stale: bool,
}

/// Minimal cache over a map, enough for workflow tests
///
/// List reads always go to the gateway; list results are only kept to
/// track which ones were staled.
pub struct MapItemCache {
    gateway: Arc<dyn ISessionGateway>,
    entries: Mutex<HashMap<ItemId, CachedCopy>>,
    lists: Mutex<HashMap<ListQuery, MapList>>,
}

impl MapItemCache {
    pub fn new(gateway: Arc<dyn ISessionGateway>) -> Self {
        Self {
            gateway,
            entries: Mutex::new(HashMap::new()),
            lists: Mutex::new(HashMap::new()),
        }
    }

    /// Number of list results marked stale
    pub fn stale_lists(&self) -> usize {
        self.lists
            .lock()
            .unwrap()
            .values()
            .filter(|list| list.stale)
            .count()
    }

    pub fn seed(&self, item: Item) {
        self.entries.lock().unwrap().insert(
            item.id.clone(),
            CachedCopy {
                item,
                source: QuerySource::Single,
                stale: false,
            },
        );
    }
}

#[async_trait::async_trait]
impl IItemCache for MapItemCache {
    async fn get_item(&self, id: &ItemId) -> Result<Item, GatewayError> {
        match self.peek(id) {
            Some(copy) if !copy.stale => Ok(copy.item),
            _ => self.refresh_item(id).await,
        }
    }

    async fn refresh_item(&self, id: &ItemId) -> Result<Item, GatewayError> {
        let item = self.gateway.get_item(id).await?;
        self.seed(item.clone());
        Ok(item)
    }

    async fn list_items(&self, query: ListQuery) -> Result<Vec<Item>, GatewayError> {
        self.refresh_list(query).await
    }

    async fn refresh_list(&self, query: ListQuery) -> Result<Vec<Item>, GatewayError> {
        let items = self.gateway.list_items().await?;
        self.lists.lock().unwrap().insert(
            query,
            MapList {
                ids: items.iter().map(|item| item.id.clone()).collect(),
                stale: false,
            },
        );
        let mut entries = self.entries.lock().unwrap();
        for item in &items {
            entries.insert(
                item.id.clone(),
                CachedCopy {
                    item: item.clone(),
                    source: QuerySource::List(query),
                    stale: false,
                },
            );
        }
        Ok(items)
    }

    fn peek(&self, id: &ItemId) -> Option<CachedCopy> {
        self.entries.lock().unwrap().get(id).cloned()
    }

    fn invalidate_item(&self, id: &ItemId) {
        if let Some(copy) = self.entries.lock().unwrap().get_mut(id) {
            copy.stale = true;
        }
    }

    fn invalidate_lists(&self) {
        for list in self.lists.lock().unwrap().values_mut() {
            list.stale = true;
        }
    }

    fn remove_item(&self, id: &ItemId) {
        self.entries.lock().unwrap().remove(id);
        for list in self.lists.lock().unwrap().values_mut() {
            if list.ids.contains(id) {
                list.stale = true;
            }
        }
    }

    fn clear(&self) {
        self.entries.lock().unwrap().clear();
        self.lists.lock().unwrap().clear();
    }

    fn watch_item(&self, id: &ItemId) -> watch::Receiver<Option<Item>> {
        let (_, rx) = watch::channel(self.peek(id).map(|copy| copy.item));
        rx
    }
}
