use folio_types::{utc_now, Action, ItemId, RevisionMeta, CONTENTTYPE_DEFAULT, CONTENTTYPE_USER};
use tracing::debug;

use crate::contenttype::{validate_contenttype, ContentType};
use crate::error::{FieldError, ValidationError};
use crate::names::{validate_name, validate_namespace, validate_tag, validate_user_name};
use crate::subscriptions::Subscription;

/// Request-supplied facts the schema uses to fill and override metadata.
///
/// `trusted` sources (backups, programmatic maintenance) keep what they
/// declare; untrusted sources (interactive edits) get `mtime`, `action`,
/// `address`, `userid` and `itemid` from here regardless of what they sent.
#[derive(Clone, Debug)]
pub struct ValidationState {
    pub trusted: bool,
    /// Itemid of the existing item, if any.
    pub itemid: Option<ItemId>,
    /// Name used when the metadata carries none.
    pub name: Option<String>,
    pub namespace: String,
    pub wikiname: Option<String>,
    pub action: Action,
    pub address: Option<String>,
    pub userid: Option<ItemId>,
    /// Content type of the item's current revision.
    pub contenttype_current: Option<String>,
    /// Content type guessed from the name or data.
    pub contenttype_guessed: Option<String>,
    /// Clock reading used for `mtime`.
    pub now: i64,
}

impl Default for ValidationState {
    fn default() -> Self {
        Self {
            trusted: false,
            itemid: None,
            name: None,
            namespace: String::new(),
            wikiname: None,
            action: Action::Save,
            address: None,
            userid: None,
            contenttype_current: None,
            contenttype_guessed: None,
            now: utc_now(),
        }
    }
}

impl ValidationState {
    /// State for a trusted source.
    pub fn trusted() -> Self {
        Self {
            trusted: true,
            ..Default::default()
        }
    }

    /// State for an untrusted, interactive source.
    pub fn untrusted() -> Self {
        Self::default()
    }
}

/// Length of a BLAKE3 hex digest.
pub const HASH_HEX_LEN: usize = 64;

/// Normalize and check revision metadata.
///
/// Fills defaults and overrides from `state`, then checks every field. All
/// failing fields are reported together. Revision metadata whose content
/// type is the user profile type is checked with the user profile rules.
pub fn validate_meta(meta: &mut RevisionMeta, state: &ValidationState) -> Result<(), ValidationError> {
    let mut errors = Vec::new();
    fill_defaults(meta, state);

    let user_profile = meta.is_user_profile();
    let check_name: fn(&str) -> Result<(), String> =
        if user_profile { validate_user_name } else { validate_name };
    for name in &meta.name {
        if let Err(reason) = check_name(name) {
            errors.push(FieldError::new("name", format!("{name:?}: {reason}")));
        }
    }
    if has_duplicates(&meta.name) {
        errors.push(FieldError::new("name", "names must be unique"));
    }

    if let Err(reason) = validate_namespace(meta.namespace_or_default()) {
        errors.push(FieldError::new("namespace", reason));
    }

    match meta.contenttype.as_deref() {
        Some(ct) if !user_profile => {
            if let Err(reason) = validate_contenttype(ct) {
                errors.push(FieldError::new("contenttype", reason));
            }
        }
        Some(_) => {}
        None => errors.push(FieldError::new("contenttype", "missing")),
    }

    if let Some(hash) = &meta.hash {
        if hash.len() != HASH_HEX_LEN || !hash.bytes().all(|b| b.is_ascii_hexdigit()) {
            errors.push(FieldError::new("hash", format!("expected {HASH_HEX_LEN} hex characters")));
        }
    }

    if meta.mtime.is_some_and(|t| t < 0) {
        errors.push(FieldError::new("mtime", "must not be negative"));
    }
    if meta.ptime.is_some_and(|t| t < 0) {
        errors.push(FieldError::new("ptime", "must not be negative"));
    }

    if let Some(acl) = &meta.acl {
        if acl.chars().any(char::is_control) {
            errors.push(FieldError::new("acl", "must be a single line"));
        }
    }

    for tag in &meta.tags {
        if let Err(reason) = validate_tag(tag) {
            errors.push(FieldError::new("tags", format!("{tag:?}: {reason}")));
        }
    }

    if !meta.subscriptions.is_empty() && !user_profile {
        errors.push(FieldError::new(
            "subscriptions",
            "only user profiles carry subscriptions",
        ));
    }
    for sub in &meta.subscriptions {
        if let Err(reason) = sub.parse::<Subscription>() {
            errors.push(FieldError::new("subscriptions", reason));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        debug!(count = errors.len(), trusted = state.trusted, "metadata rejected");
        Err(ValidationError { fields: errors })
    }
}

fn fill_defaults(meta: &mut RevisionMeta, state: &ValidationState) {
    if !state.trusted || meta.itemid.is_none() {
        meta.itemid = Some(state.itemid.clone().unwrap_or_default());
    }
    if meta.name.is_empty() {
        if let Some(name) = &state.name {
            meta.name.push(name.clone());
        }
    }
    if meta.namespace.is_none() {
        meta.namespace = Some(state.namespace.clone());
    }
    if meta.wikiname.is_none() {
        meta.wikiname = state.wikiname.clone();
    }
    if meta.contenttype.is_none() {
        meta.contenttype = state
            .contenttype_current
            .clone()
            .or_else(|| state.contenttype_guessed.clone())
            .or_else(|| Some(CONTENTTYPE_DEFAULT.to_string()));
    }
    if !state.trusted || meta.mtime.is_none() {
        meta.mtime = Some(state.now);
    }
    if !state.trusted || meta.action.is_none() {
        meta.action = Some(state.action);
    }
    if !state.trusted {
        meta.address = state.address.clone();
        meta.userid = state.userid.clone();
    }
}

fn has_duplicates(names: &[String]) -> bool {
    let mut seen = std::collections::HashSet::new();
    !names.iter().all(|n| seen.insert(n))
}

/// Check that a text payload decodes in its declared charset.
pub fn validate_data(meta: &RevisionMeta, data: &[u8]) -> Result<(), ValidationError> {
    let Some(ct) = meta.contenttype.as_deref() else {
        return Ok(());
    };
    if ct == CONTENTTYPE_USER {
        return Ok(());
    }
    let Ok(ct) = ContentType::parse(ct) else {
        return Ok(());
    };
    if !ct.is_text() {
        return Ok(());
    }
    let ok = match ct.charset().as_deref() {
        Some("ascii") => data.is_ascii(),
        _ => std::str::from_utf8(data).is_ok(),
    };
    if ok {
        Ok(())
    } else {
        Err(ValidationError::single(
            "data",
            format!("payload is not valid {}", ct.charset().unwrap_or_else(|| "utf-8".into())),
        ))
    }
}
