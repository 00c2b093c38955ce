mod health_check;
mod session;

pub use health_check::health_check;
pub use session::{check, login, logout, method_not_allowed, refresh};

use serde::Serialize;

/// Success envelope: `{ "data": <payload> }`
#[derive(Serialize)]
pub struct DataEnvelope<T: Serialize> {
    pub data: T,
}

impl<T: Serialize> DataEnvelope<T> {
    pub fn new(data: T) -> Self {
        Self { data }
    }
}
