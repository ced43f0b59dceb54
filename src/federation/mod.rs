//! ForgeFed federation module
//!
//! Handles:
//! - IRI encoding/decoding
//! - Bounded object fetching over a pluggable transport
//! - HTTP Signatures and actor/keyId binding
//! - Materializing remote actors, repositories, tickets and notes
//! - Activity processing (inbox)
//! - Activity delivery (outbox)
//! - WebFinger

mod activity;
mod delivery;
mod fetch;
pub mod iri;
pub mod keys;
mod materialize;
#[cfg(any(test, feature = "test-utils"))]
mod memory;
pub mod object;
mod signature;
pub mod transport;
mod webfinger;

pub use activity::{ActivityProcessor, with_reply_context};
pub use delivery::{ActivityDelivery, DeliveryResult, builder};
pub use fetch::{ACTIVITY_STREAMS_ACCEPT, ACTIVITY_STREAMS_CONTENT_TYPE, ObjectFetcher};
pub use iri::IriCodec;
pub use materialize::Materializer;
pub use signature::{
    MAIN_KEY_SUFFIX, SignatureHeaders, SignatureVerifier, Verification, check_activity_binding,
    extract_signature_key_id, generate_digest, main_key_id, parse_signature_header,
    public_key_from_person, sign_request, verify_signature,
};
#[cfg(any(test, feature = "test-utils"))]
pub use memory::{MemoryTransport, RecordedPost};
pub use transport::{HttpTransport, Transport, TransportResponse};
pub use webfinger::{
    WebFingerLink, WebFingerResponse, generate_webfinger_response, resolve_actor_name,
};
