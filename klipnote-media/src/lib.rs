//! Upload Pipeline's storage half (spec §4.4): a local-filesystem media
//! store for original bytes and materialized transcripts, plus the external
//! media probe. Collapsed from the teacher's multi-backend, multi-tenant
//! `dog-blob` abstraction (`BlobStore`/`ByteRange`/`GetResult`) down to the
//! single local-disk backend this spec actually names — KlipNote has no
//! S3/signed-url backend and no tenant namespacing (see `SPEC_FULL.md` §13).

pub mod range;
pub mod store;
pub mod probe;

pub use range::{ByteRange, ResolvedRange};
pub use store::{ByteStream, LocalMediaStore, OpenedMedia, ReceivedUpload};
pub use probe::{FfprobeProbe, MediaProbe, ProbeInfo};
