//! ActivityStreams / ForgeFed object graph
//!
//! A closed set of object kinds decoded by looking at the declared `type`
//! first and then deserializing the concrete struct. Decoding carries no
//! shared state, so concurrent requests decode independently.

use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const ACTIVITY_STREAMS_CONTEXT: &str = "https://www.w3.org/ns/activitystreams";
pub const SECURITY_CONTEXT: &str = "https://w3id.org/security/v1";
pub const FORGEFED_CONTEXT: &str = "https://forgefed.org/ns";

/// Serialize `value` and attach the three JSON-LD contexts.
pub fn with_context<T: Serialize>(value: &T) -> Result<Value, serde_json::Error> {
    let mut document = serde_json::to_value(value)?;
    if let Value::Object(map) = &mut document {
        map.insert(
            "@context".to_string(),
            serde_json::json!([ACTIVITY_STREAMS_CONTEXT, SECURITY_CONTEXT, FORGEFED_CONTEXT]),
        );
    }
    Ok(document)
}

// =============================================================================
// Field codecs
// =============================================================================

/// Links may arrive as a bare IRI, an object with `id`/`href`, or an array of either.
mod link {
    use super::*;

    pub(super) fn from_value(value: Value) -> Option<String> {
        match value {
            Value::String(iri) => Some(iri),
            Value::Object(map) => map
                .get("id")
                .or_else(|| map.get("href"))
                .and_then(Value::as_str)
                .map(str::to_string),
            Value::Array(items) => items.into_iter().find_map(from_value),
            _ => None,
        }
    }

    pub fn option<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
        let value = Option::<Value>::deserialize(deserializer)?;
        Ok(value.and_then(from_value))
    }

    pub fn many<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
        let value = Option::<Value>::deserialize(deserializer)?;
        Ok(match value {
            Some(Value::Array(items)) => items.into_iter().filter_map(from_value).collect(),
            Some(other) => from_value(other).into_iter().collect(),
            None => Vec::new(),
        })
    }
}

/// Natural language values: a plain string or a `{lang: string}` map.
mod text {
    use super::*;

    pub fn option<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
        let value = Option::<Value>::deserialize(deserializer)?;
        Ok(match value {
            Some(Value::String(text)) => Some(text),
            Some(Value::Object(map)) => map
                .get("en")
                .or_else(|| map.values().find(|value| value.is_string()))
                .and_then(Value::as_str)
                .map(str::to_string),
            _ => None,
        })
    }
}

// =============================================================================
// Object kinds
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicKey {
    pub id: String,
    #[serde(default, deserialize_with = "link::option", skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(default)]
    pub public_key_pem: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Image {
    #[serde(rename = "type", default = "Image::kind")]
    pub kind: String,
    #[serde(default, deserialize_with = "link::option", skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
}

impl Image {
    fn kind() -> String {
        "Image".to_string()
    }

    pub fn png(url: String) -> Self {
        Self {
            kind: Self::kind(),
            url: Some(url),
            media_type: Some("image/png".to_string()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Person {
    pub id: String,
    #[serde(default, deserialize_with = "text::option", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "text::option", skip_serializing_if = "Option::is_none")]
    pub preferred_username: Option<String>,
    #[serde(default, deserialize_with = "text::option", skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, deserialize_with = "link::option", skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, deserialize_with = "link::option", skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<Image>,
    #[serde(default, deserialize_with = "link::option", skip_serializing_if = "Option::is_none")]
    pub inbox: Option<String>,
    #[serde(default, deserialize_with = "link::option", skip_serializing_if = "Option::is_none")]
    pub outbox: Option<String>,
    #[serde(default, deserialize_with = "link::option", skip_serializing_if = "Option::is_none")]
    pub following: Option<String>,
    #[serde(default, deserialize_with = "link::option", skip_serializing_if = "Option::is_none")]
    pub followers: Option<String>,
    #[serde(default, deserialize_with = "link::option", skip_serializing_if = "Option::is_none")]
    pub liked: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<PublicKey>,
}

/// ForgeFed Repository actor
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Repository {
    pub id: String,
    #[serde(default, deserialize_with = "text::option", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "link::option", skip_serializing_if = "Option::is_none")]
    pub attributed_to: Option<String>,
    #[serde(default, deserialize_with = "text::option", skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, deserialize_with = "link::option", skip_serializing_if = "Option::is_none")]
    pub inbox: Option<String>,
    #[serde(default, deserialize_with = "link::option", skip_serializing_if = "Option::is_none")]
    pub outbox: Option<String>,
    #[serde(default, deserialize_with = "link::option", skip_serializing_if = "Option::is_none")]
    pub followers: Option<String>,
    #[serde(default, deserialize_with = "link::option", skip_serializing_if = "Option::is_none")]
    pub team: Option<String>,
    #[serde(default, deserialize_with = "link::option", skip_serializing_if = "Option::is_none")]
    pub forked_from: Option<String>,
}

/// ForgeFed Ticket: an issue, or a pull request when `origin` and `target` are both set
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticket {
    pub id: String,
    /// `#<index>`
    #[serde(default, deserialize_with = "text::option", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "link::option", skip_serializing_if = "Option::is_none")]
    pub attributed_to: Option<String>,
    #[serde(default, deserialize_with = "text::option", skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, deserialize_with = "text::option", skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Owning repository
    #[serde(default, deserialize_with = "link::option", skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(default)]
    pub is_resolved: bool,
    #[serde(default, deserialize_with = "link::option", skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    #[serde(default, deserialize_with = "link::option", skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

impl Ticket {
    pub fn is_pull_request(&self) -> bool {
        self.origin.is_some() && self.target.is_some()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: String,
    #[serde(default, deserialize_with = "link::option", skip_serializing_if = "Option::is_none")]
    pub attributed_to: Option<String>,
    #[serde(default, deserialize_with = "text::option", skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Ticket the note belongs to
    #[serde(default, deserialize_with = "link::option", skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(default, deserialize_with = "link::option", skip_serializing_if = "Option::is_none")]
    pub in_reply_to: Option<String>,
    #[serde(default, deserialize_with = "link::many", skip_serializing_if = "Vec::is_empty")]
    pub to: Vec<String>,
}

// =============================================================================
// Activities
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActivityKind {
    Follow,
    Undo,
    Create,
    Like,
    Delete,
}

impl ActivityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Follow => "Follow",
            Self::Undo => "Undo",
            Self::Create => "Create",
            Self::Like => "Like",
            Self::Delete => "Delete",
        }
    }

    fn parse(kind: &str) -> Option<Self> {
        match kind {
            "Follow" => Some(Self::Follow),
            "Undo" => Some(Self::Undo),
            "Create" => Some(Self::Create),
            "Like" => Some(Self::Like),
            "Delete" => Some(Self::Delete),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    #[serde(rename = "type")]
    pub kind: ActivityKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "link::option", skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
    #[serde(default, deserialize_with = "link::option", skip_serializing_if = "Option::is_none")]
    pub attributed_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object: Option<ObjectOrLink>,
    #[serde(default, deserialize_with = "link::many", skip_serializing_if = "Vec::is_empty")]
    pub to: Vec<String>,
}

impl Activity {
    pub fn new(kind: ActivityKind, actor: &str, object: ObjectOrLink, to: Vec<String>) -> Self {
        Self {
            kind,
            id: None,
            actor: Some(actor.to_string()),
            attributed_to: None,
            object: Some(object),
            to,
        }
    }

    /// IRI of the object, whether embedded or linked.
    pub fn object_iri(&self) -> Option<&str> {
        self.object.as_ref().and_then(ObjectOrLink::iri)
    }

    /// Embedded object, if the activity carries one.
    pub fn embedded(&self) -> Option<&Object> {
        self.object.as_ref().and_then(ObjectOrLink::as_object)
    }
}

/// Object slot of an activity: a bare IRI or an embedded object
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectOrLink {
    Link(String),
    Object(Box<Object>),
}

impl ObjectOrLink {
    pub fn iri(&self) -> Option<&str> {
        match self {
            Self::Link(iri) => Some(iri),
            Self::Object(object) => object.id(),
        }
    }

    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Self::Link(_) => None,
            Self::Object(object) => Some(object),
        }
    }
}

impl From<Object> for ObjectOrLink {
    fn from(object: Object) -> Self {
        Self::Object(Box::new(object))
    }
}

impl Serialize for ObjectOrLink {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Link(iri) => serializer.serialize_str(iri),
            Self::Object(object) => object.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for ObjectOrLink {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        match value {
            Value::String(iri) => Ok(Self::Link(iri)),
            Value::Object(ref map) if !map.contains_key("type") => link::from_value(value)
                .map(Self::Link)
                .ok_or_else(|| de::Error::custom("object reference has neither type nor id")),
            Value::Object(_) => Object::from_value(value)
                .map(|object| Self::Object(Box::new(object)))
                .map_err(de::Error::custom),
            other => Err(de::Error::custom(format!(
                "expected object or IRI, found {}",
                other
            ))),
        }
    }
}

// =============================================================================
// Polymorphic object
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum Object {
    Person(Person),
    Repository(Repository),
    Ticket(Ticket),
    Note(Note),
    Activity(Activity),
    /// Any other declared type; carried so callers can report it
    Unknown { kind: String, id: Option<String> },
}

/// Declared type; the first entry when `type` is an array.
fn declared_type(value: &Value) -> Option<String> {
    match value.get("type")? {
        Value::String(kind) => Some(kind.clone()),
        Value::Array(kinds) => kinds.iter().find_map(Value::as_str).map(str::to_string),
        _ => None,
    }
}

impl Object {
    pub fn from_value(mut value: Value) -> Result<Self, serde_json::Error> {
        let kind = declared_type(&value)
            .ok_or_else(|| <serde_json::Error as de::Error>::custom("object has no type"))?;
        if let Value::Object(map) = &mut value {
            map.insert("type".to_string(), Value::String(kind.clone()));
        }

        match kind.as_str() {
            "Person" => serde_json::from_value(value).map(Self::Person),
            "Repository" => serde_json::from_value(value).map(Self::Repository),
            "Ticket" => serde_json::from_value(value).map(Self::Ticket),
            "Note" => serde_json::from_value(value).map(Self::Note),
            other if ActivityKind::parse(other).is_some() => {
                serde_json::from_value(value).map(Self::Activity)
            }
            _ => Ok(Self::Unknown {
                id: value.get("id").and_then(Value::as_str).map(str::to_string),
                kind,
            }),
        }
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_slice(bytes)?;
        Self::from_value(value)
    }

    pub fn kind(&self) -> &str {
        match self {
            Self::Person(_) => "Person",
            Self::Repository(_) => "Repository",
            Self::Ticket(_) => "Ticket",
            Self::Note(_) => "Note",
            Self::Activity(activity) => activity.kind.as_str(),
            Self::Unknown { kind, .. } => kind,
        }
    }

    pub fn id(&self) -> Option<&str> {
        match self {
            Self::Person(person) => Some(&person.id),
            Self::Repository(repo) => Some(&repo.id),
            Self::Ticket(ticket) => Some(&ticket.id),
            Self::Note(note) => Some(&note.id),
            Self::Activity(activity) => activity.id.as_deref(),
            Self::Unknown { id, .. } => id.as_deref(),
        }
    }
}

impl<'de> Deserialize<'de> for Object {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_value(value).map_err(de::Error::custom)
    }
}

impl Serialize for Object {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        struct Tagged<'a, T> {
            #[serde(rename = "type")]
            kind: &'a str,
            #[serde(flatten)]
            inner: &'a T,
        }

        match self {
            Self::Person(person) => Tagged {
                kind: "Person",
                inner: person,
            }
            .serialize(serializer),
            Self::Repository(repo) => Tagged {
                kind: "Repository",
                inner: repo,
            }
            .serialize(serializer),
            Self::Ticket(ticket) => Tagged {
                kind: "Ticket",
                inner: ticket,
            }
            .serialize(serializer),
            Self::Note(note) => Tagged {
                kind: "Note",
                inner: note,
            }
            .serialize(serializer),
            Self::Activity(activity) => activity.serialize(serializer),
            Self::Unknown { kind, id } => {
                serde_json::json!({ "type": kind, "id": id }).serialize(serializer)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_undo_with_embedded_like() {
        let document = json!({
            "@context": ["https://www.w3.org/ns/activitystreams", "https://forgefed.org/ns"],
            "type": "Undo",
            "actor": "https://remote.example/actor/bob",
            "object": {
                "type": "Like",
                "actor": {"type": "Person", "id": "https://remote.example/actor/bob"},
                "object": "https://local.example/repo/alice/widgets"
            },
            "to": "https://local.example/repo/alice/widgets/inbox"
        });

        let object: Object = serde_json::from_value(document).unwrap();
        let Object::Activity(undo) = object else {
            panic!("expected activity");
        };
        assert_eq!(undo.kind, ActivityKind::Undo);
        assert_eq!(undo.to, vec!["https://local.example/repo/alice/widgets/inbox"]);

        let Some(Object::Activity(like)) = undo.embedded() else {
            panic!("expected embedded like");
        };
        assert_eq!(like.kind, ActivityKind::Like);
        assert_eq!(like.actor.as_deref(), Some("https://remote.example/actor/bob"));
        assert_eq!(
            like.object_iri(),
            Some("https://local.example/repo/alice/widgets")
        );
    }

    #[test]
    fn decodes_ticket_and_detects_pull_request() {
        let document = json!({
            "type": ["Ticket"],
            "id": "https://remote.example/ticket/bob/widgets/4",
            "name": {"en": "#4"},
            "attributedTo": "https://remote.example/actor/bob",
            "context": "https://remote.example/repo/bob/widgets",
            "isResolved": true,
            "origin": "https://remote.example/branch/bob/widgets/feature",
            "target": "https://local.example/branch/alice/widgets/main"
        });

        let Object::Ticket(ticket) = Object::from_value(document).unwrap() else {
            panic!("expected ticket");
        };
        assert_eq!(ticket.name.as_deref(), Some("#4"));
        assert!(ticket.is_resolved);
        assert!(ticket.is_pull_request());
    }

    #[test]
    fn unknown_types_are_preserved_and_missing_type_fails() {
        let object = Object::from_value(json!({"type": "Announce", "id": "https://x/1"})).unwrap();
        assert_eq!(object.kind(), "Announce");
        assert_eq!(object.id(), Some("https://x/1"));

        assert!(Object::from_value(json!({"id": "https://x/1"})).is_err());
    }

    #[test]
    fn person_requires_id_and_tolerates_missing_key_pem() {
        assert!(Object::from_value(json!({"type": "Person"})).is_err());

        let Object::Person(person) = Object::from_value(json!({
            "type": "Person",
            "id": "https://remote.example/actor/bob",
            "publicKey": {"id": "https://remote.example/actor/bob#main-key"}
        }))
        .unwrap() else {
            panic!("expected person");
        };
        assert_eq!(
            person.public_key.map(|key| key.public_key_pem),
            Some(String::new())
        );
    }

    #[test]
    fn serialized_documents_carry_type_and_contexts() {
        let like = Activity::new(
            ActivityKind::Like,
            "https://local.example/actor/alice",
            ObjectOrLink::Link("https://remote.example/repo/bob/widgets".to_string()),
            vec!["https://remote.example/repo/bob/widgets/inbox".to_string()],
        );
        let document = with_context(&Object::Activity(like)).unwrap();
        assert_eq!(document["type"], "Like");
        assert_eq!(document["object"], "https://remote.example/repo/bob/widgets");
        assert_eq!(document["@context"].as_array().map(Vec::len), Some(3));

        let note = Object::Note(Note {
            id: "https://local.example/ticket/alice/widgets/1/c1".to_string(),
            content: Some("hi".to_string()),
            ..Note::default()
        });
        let value = serde_json::to_value(&note).unwrap();
        assert_eq!(value["type"], "Note");
        assert!(value.get("inReplyTo").is_none());
    }
}
