// Marker header attached to responses served by the proxy; never persisted.
pub const RESULT_HEADER: &str = "x-wayside-result";

pub const VALUE_FORM_URLENCODED: &str = "application/x-www-form-urlencoded";
pub const VALUE_MULTIPART_FORM_DATA: &str = "multipart/form-data";
pub const VALUE_MULTIPART_BYTERANGES: &str = "multipart/byteranges";
pub const VALUE_APPLICATION_JSON: &str = "application/json";

// Leading byte on byte-store blobs, ahead of the encoded document.
pub const COMPRESSION_NONE: u8 = 0;
pub const COMPRESSION_SNAPPY: u8 = 1;
