mod content;
mod relay;

pub use self::content::ContentReader;
pub use self::relay::{
    decode_body, flatten_headers, RelayService, ValidatedRequest, DEFAULT_MAX_BODY_SIZE,
    DEFAULT_RELAY_TIMEOUT,
};
