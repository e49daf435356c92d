//! Transform adapters from upstream API shapes into domain models.

pub(crate) mod adverse_event;
pub(crate) mod article;
pub(crate) mod trial;
