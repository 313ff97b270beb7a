use log::{debug, warn};

use crate::device::constants::{
    ATTENTION_OFFSET, MAX_BUFFERED_BYTES, MEDITATION_OFFSET, PACKET_SIZE, PACKET_SYNC, SIGNAL_QUALITY_OFFSET,
};
use crate::device::types::ChannelSample;

/// Reassembles packets from the notification byte stream of one channel.
///
/// Notifications may split a packet, or carry several. Bytes that precede a
/// sync sequence are discarded.
#[derive(Debug, Default)]
pub struct PacketDecoder {
    buffer: Vec<u8>,
}

fn find_sync(buffer: &[u8]) -> Option<usize> {
    buffer.windows(PACKET_SYNC.len()).position(|window| window == PACKET_SYNC)
}

fn decode_packet(packet: &[u8]) -> ChannelSample {
    ChannelSample {
        meditation: f32::from(packet[MEDITATION_OFFSET]),
        attention: Some(packet[ATTENTION_OFFSET]),
        signal_quality: Some(packet[SIGNAL_QUALITY_OFFSET]),
    }
}

impl PacketDecoder {
    pub fn new() -> Self {
        PacketDecoder::default()
    }

    pub fn push(&mut self, data: &[u8]) -> Vec<ChannelSample> {
        self.buffer.extend_from_slice(data);
        let mut samples = Vec::new();

        while let Some(start) = find_sync(&self.buffer) {
            if start > 0 {
                debug!("Skipping {} bytes before packet sync", start);
                self.buffer.drain(..start);
            }

            if self.buffer.len() < PACKET_SIZE {
                break;
            }

            let packet: Vec<u8> = self.buffer.drain(..PACKET_SIZE).collect();
            samples.push(decode_packet(&packet));
        }

        // keep a possible partial sync sequence at the tail, drop the rest
        if find_sync(&self.buffer).is_none() && self.buffer.len() > MAX_BUFFERED_BYTES {
            warn!("Dropping {} bytes without packet sync", self.buffer.len());
            let keep = PACKET_SYNC.len() - 1;
            let drop = self.buffer.len() - keep;
            self.buffer.drain(..drop);
        }

        samples
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet(signal_quality: u8, meditation: u8, attention: u8) -> Vec<u8> {
        let mut packet = vec![0u8; PACKET_SIZE];
        packet[..3].copy_from_slice(&PACKET_SYNC);
        packet[SIGNAL_QUALITY_OFFSET] = signal_quality;
        packet[MEDITATION_OFFSET] = meditation;
        packet[ATTENTION_OFFSET] = attention;
        packet
    }

    #[test]
    fn decodes_a_whole_packet() {
        let mut decoder = PacketDecoder::new();
        let samples = decoder.push(&packet(0, 70, 42));

        assert_eq!(samples, vec![ChannelSample {
            meditation: 70.0,
            attention: Some(42),
            signal_quality: Some(0),
        }]);
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn reassembles_fragmented_packets() {
        let mut decoder = PacketDecoder::new();
        let data = packet(26, 55, 10);

        assert!(decoder.push(&data[..20]).is_empty());
        assert_eq!(decoder.buffered(), 20);

        let samples = decoder.push(&data[20..]);
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].meditation, 55.0);
        assert_eq!(samples[0].signal_quality, Some(26));
    }

    #[test]
    fn skips_garbage_before_sync() {
        let mut decoder = PacketDecoder::new();
        let mut data = vec![0x01, 0x02, 0xAA];
        data.extend(packet(0, 80, 1));

        let samples = decoder.push(&data);
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].meditation, 80.0);
    }

    #[test]
    fn decodes_several_packets_from_one_notification() {
        let mut decoder = PacketDecoder::new();
        let mut data = packet(0, 10, 0);
        data.extend(packet(0, 20, 0));
        data.extend(&PACKET_SYNC);

        let samples = decoder.push(&data);
        assert_eq!(samples.iter().map(|s| s.meditation).collect::<Vec<_>>(), vec![10.0, 20.0]);
        assert_eq!(decoder.buffered(), PACKET_SYNC.len());
    }

    #[test]
    fn bounds_the_buffer_without_sync() {
        let mut decoder = PacketDecoder::new();
        decoder.push(&vec![0x55; MAX_BUFFERED_BYTES + 10]);
        assert_eq!(decoder.buffered(), PACKET_SYNC.len() - 1);

        // a sync split across notifications still decodes
        let data = packet(0, 33, 0);
        decoder.push(&[0xAA]);
        let samples = decoder.push(&data[1..]);
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].meditation, 33.0);
    }
}
