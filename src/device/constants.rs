use uuid::Uuid;

/**
 * The UUID of the notify characteristic carrying the left channel packets.
 */
pub const LEFT_CHANNEL_CHARACTERISTIC: &str = "6e400003-b5b0-f393-e0a9-e50e24dcca9f";

/**
 * The UUID of the notify characteristic carrying the right channel packets.
 */
pub const RIGHT_CHANNEL_CHARACTERISTIC: &str = "6e400003-b5b1-f393-e0a9-e50e24dcca9f";

/**
 * Every packet starts with this byte sequence.
 */
pub const PACKET_SYNC: [u8; 3] = [0xAA, 0xAA, 0x20];

/**
 * The length (bytes) of a packet, including the sync sequence.
 */
pub const PACKET_SIZE: usize = 36;

pub const SIGNAL_QUALITY_OFFSET: usize = 4;
pub const MEDITATION_OFFSET: usize = 32;
pub const ATTENTION_OFFSET: usize = 34;

/**
 * Buffered bytes without a sync sequence beyond this length are dropped.
 */
pub const MAX_BUFFERED_BYTES: usize = PACKET_SIZE * 8;

/**
 * How long (milliseconds) establishing a connection to the peripheral may take.
 */
pub const CONNECT_DEADLINE: u64 = 10_000;

/**
 * How long (milliseconds) a disconnect from the peripheral may take.
 */
pub const DISCONNECT_DEADLINE: u64 = 2000;

/**
 * How long (milliseconds) checking if the peripheral is still connected may take.
 */
pub const IS_CONNECTED_DEADLINE: u64 = 2000;

/**
 * How often (milliseconds) the link to a streaming peripheral is checked.
 */
pub const LINK_POLL_INTERVAL: u64 = 1000;

/**
 * The range of the meditation value reported by the device.
 */
pub const METRIC_MIN: f32 = 0.0;
pub const METRIC_MAX: f32 = 100.0;

pub fn make_left_channel_uuid() -> Uuid {
    Uuid::parse_str(LEFT_CHANNEL_CHARACTERISTIC).unwrap()
}

pub fn make_right_channel_uuid() -> Uuid {
    Uuid::parse_str(RIGHT_CHANNEL_CHARACTERISTIC).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_uuids_parse_and_differ() {
        assert_ne!(make_left_channel_uuid(), make_right_channel_uuid());
    }
}
