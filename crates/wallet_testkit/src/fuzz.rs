//! Fuzz harnesses.
//!
//! Each target must return normally for any input; a panic is a bug.

use wallet_sync_protocol::{decode_client_message, EntityKind, FrameDecoder, Phase};

/// Feeds `data` to a frame decoder in chunks whose sizes come from the
/// input itself, draining frames after each chunk.
pub fn fuzz_frame_decoder(data: &[u8]) {
    let mut decoder = FrameDecoder::with_max_frame_len(64 * 1024);
    let mut rest = data;
    while let Some((&size, tail)) = rest.split_first() {
        let take = usize::from(size % 16).max(1).min(tail.len());
        decoder.extend(&tail[..take]);
        rest = &tail[take..];
        loop {
            match decoder.decode_next() {
                Ok(Some(_)) => {}
                Ok(None) => break,
                Err(_) => return,
            }
        }
    }
    let _ = decoder.finish();
}

/// Decodes `data` as a client message in every phase.
pub fn fuzz_client_message(data: &[u8]) {
    let mut phases = vec![Phase::NotIdentified, Phase::Finished, Phase::Error];
    for kind in EntityKind::ALL {
        phases.push(Phase::Waiting(kind));
        phases.push(Phase::Sent(kind));
    }
    for phase in phases {
        let _ = decode_client_message(phase, data);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn decoder_never_panics(data in prop::collection::vec(any::<u8>(), 0..512)) {
            fuzz_frame_decoder(&data);
        }

        #[test]
        fn message_decoding_never_panics(data in prop::collection::vec(any::<u8>(), 0..256)) {
            fuzz_client_message(&data);
        }
    }

    #[test]
    fn known_nasty_inputs() {
        fuzz_frame_decoder(&[0x00, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff]);
        fuzz_client_message(&[0xbf, 0xff]);
        fuzz_client_message(&[0x9f; 64]);
    }
}
