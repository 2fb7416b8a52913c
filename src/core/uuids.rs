//! UUIDs of the example service shared by the client profile and the peripheral

use uuid::Uuid;

/// Example service UUID
pub const EXAMPLE_SERVICE_UUID: Uuid = Uuid::from_u128(0x2ed16a66_9bcf_4fb3_9d09_0e350ea8e3ef);

/// Write-only characteristic of the example service
pub const EXAMPLE_WRITE_CHAR_UUID: Uuid = Uuid::from_u128(0x6bdfd2ad_cc68_42e6_88f1_463c2ef984ea);

/// Read-only characteristic of the example service
pub const EXAMPLE_READ_CHAR_UUID: Uuid = Uuid::from_u128(0xb6c1ba10_0f87_4896_b7f0_65990c20165f);

/// Descriptor describing the write characteristic
pub const EXAMPLE_WRITE_DESCRIPTOR_UUID: Uuid =
    Uuid::from_u128(0x6c45360d_3a33_4783_847b_efda9b2108df);

/// Descriptor describing the read characteristic
pub const EXAMPLE_READ_DESCRIPTOR_UUID: Uuid =
    Uuid::from_u128(0x9c548e0c_de1b_443b_8d59_6e981503490c);

/// Value of the write characteristic's descriptor
pub const WRITE_DESCRIPTOR_TEXT: &str = "Write only property";

/// Value of the read characteristic's descriptor
pub const READ_DESCRIPTOR_TEXT: &str = "Read only property";

/// Capacity of the peripheral's value store
pub const MAX_VALUE_LEN: usize = 1024;
