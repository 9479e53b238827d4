use std::sync::Arc;

use serde::Serialize;

use crate::db::LedgerStore;

pub mod error;
pub mod mock;
pub mod order_gateway;
pub mod referral;
pub mod referral_ledger;
pub mod user_service;

/// Whether a real store backs the services.
///
/// `Unavailable` switches every operation to fabricated responses flagged
/// with `mock = true`.
#[derive(Clone)]
pub enum Persistence {
    Available(Arc<dyn LedgerStore>),
    Unavailable,
}

impl Persistence {
    pub fn mode(&self) -> &'static str {
        match self {
            Persistence::Available(_) => "persistent",
            Persistence::Unavailable => "mock",
        }
    }
}

impl std::fmt::Debug for Persistence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Persistence").field(&self.mode()).finish()
    }
}

/// A service result plus whether it was fabricated rather than stored.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Outcome<T> {
    pub data: T,
    pub mock: bool,
}

impl<T> Outcome<T> {
    pub fn real(data: T) -> Self {
        Outcome { data, mock: false }
    }

    pub fn mock(data: T) -> Self {
        Outcome { data, mock: true }
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Outcome<U> {
        Outcome {
            data: f(self.data),
            mock: self.mock,
        }
    }
}
