pub mod local;
pub mod remote;

pub use local::{
    Amenities, BranchRecord, DealTypeRecord, LandlordRecord, ListingRecord, NewPriceRecord,
    Owner, OwnerProfile, PhotoRecord, PriceStatus, PropertyTypeRecord, StaffRecord, SyncStatus,
    SyncStatusUpdate, TagRecord,
};
pub use remote::{
    RemoteBranch, RemoteLandlord, RemoteListing, RemoteLocation, RemoteOperation, RemotePhoto,
    RemotePrice, RemotePropertyType, RemoteStaff, RemoteTag,
};

/// Local primary key of any row in the store.
pub type LocalId = i64;

/// External identifier assigned by the brokerage API.
pub type ExternalId = i64;
