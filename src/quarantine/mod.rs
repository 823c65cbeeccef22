//! Quarantine: encrypted suspension of infected files with
//! crash-consistent bookkeeping, per-path locking, and vault
//! size/age governance.

pub mod encryption;
pub mod lock;
pub mod metadata;
pub mod vault;

pub use encryption::VaultCipher;
pub use lock::PathLock;
pub use metadata::{QuarantineMetadata, QuarantineRecord};
pub use vault::{QuarantineVault, VaultStats};
