//! End-to-end transfers: sender and receiver state machines driven over the
//! in-memory loopback link, with loss and corruption injected in the middle.
//!
//! Each node runs on its own thread, the way the two radios run on two
//! boards; the wire taps record every transmission attempt so the tests can
//! assert the exact frame sequence, not just the final blob.

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use filelink::blob::{CompressedFileSink, CompressedFileSource, FileSink, FileSource};
use filelink::chunker;
use filelink::crc::LINK_CRC16;
use filelink::decode::Decode;
use filelink::encode::Encode;
use filelink::frame::{AckFrame, AckTag, BurstFrame, DataFrame, CRC_SIZE, EOT_PAYLOAD};
use filelink::port::loopback::{loopback_pair, FaultAction, LoopbackPort};
use filelink::port::RadioPort;
use filelink::protocol::burst::{transfer_digest, BurstReceiver, BurstSender};
use filelink::protocol::stop_wait::{StopWaitReceiver, StopWaitSender};
use filelink::protocol::{TransferError, RETRY_LIMIT};
use filelink::{LinkConfig, Session, Variant};

type Tap = Arc<Mutex<Vec<Vec<u8>>>>;

fn test_config() -> LinkConfig {
    // Surface protocol warnings in failing runs; only the first init wins.
    let _ = simplelog::SimpleLogger::init(log::LevelFilter::Warn, simplelog::Config::default());

    // The acknowledgement deadline stays well above the receiver's quiet
    // timeout so a cut-short window is always answered in time.
    LinkConfig {
        data_timeout: Duration::from_millis(10),
        ack_timeout: Duration::from_millis(50),
        align_timeout: Duration::from_millis(50),
        ..LinkConfig::default()
    }
}

/// Records every transmission attempt leaving `port`, applying `fault` to
/// decide each frame's fate.
fn tap_with_fault(
    port: &mut LoopbackPort,
    mut fault: impl FnMut(usize, &[u8]) -> FaultAction + Send + 'static,
) -> Tap {
    let frames: Tap = Arc::new(Mutex::new(Vec::new()));
    let recorded = frames.clone();
    let mut count = 0;
    port.set_send_fault(move |frame| {
        recorded.lock().unwrap().push(frame.to_vec());
        count += 1;
        fault(count, frame)
    });
    frames
}

fn tap(port: &mut LoopbackPort) -> Tap {
    tap_with_fault(port, |_, _| FaultAction::Pass)
}

fn decode_acks(frames: &[Vec<u8>]) -> Vec<AckFrame> {
    frames
        .iter()
        .map(|raw| AckFrame::decode(&mut raw.as_slice()).unwrap())
        .collect()
}

fn patch_crc(frame: &mut [u8]) {
    let crc = LINK_CRC16.checksum(&frame[CRC_SIZE..]);
    frame[..CRC_SIZE].copy_from_slice(&crc.to_be_bytes());
}

fn stop_wait_transfer(
    config: &LinkConfig,
    blob: &[u8],
    mut tx: LoopbackPort,
    rx: LoopbackPort,
) -> (Result<(), TransferError>, Result<Vec<Vec<u8>>, TransferError>) {
    let chunks = chunker::split(blob, config.data_size);
    let rx_config = config.clone();
    let receiver = thread::spawn(move || {
        let mut rx = rx;
        StopWaitReceiver::new(&rx_config, &mut rx).run()
    });
    let sent = StopWaitSender::new(config, &mut tx).run(&chunks);
    (sent, receiver.join().unwrap())
}

fn burst_transfer(
    config: &LinkConfig,
    blob: &[u8],
    mut tx: LoopbackPort,
    rx: LoopbackPort,
) -> (Result<(), TransferError>, Result<Vec<Vec<u8>>, TransferError>) {
    let chunks = chunker::split(blob, config.data_size);
    let rx_config = config.clone();
    let receiver = thread::spawn(move || {
        let mut rx = rx;
        BurstReceiver::new(&rx_config, &mut rx).run()
    });
    let sent = BurstSender::new(config, &mut tx).run(&chunks);
    (sent, receiver.join().unwrap())
}

#[test]
fn clean_stop_wait_transfer_and_wire_sequence() {
    let config = test_config();
    let blob = vec![b'A'; 84];

    let (mut tx, mut rx) = loopback_pair();
    let data_tap = tap(&mut tx);
    let ack_tap = tap(&mut rx);

    let (sent, received) = stop_wait_transfer(&config, &blob, tx, rx);
    sent.unwrap();
    assert_eq!(chunker::join(&received.unwrap()), blob);

    // Three full chunks, then the marker numbered after them.
    let frames: Vec<DataFrame> = data_tap
        .lock()
        .unwrap()
        .iter()
        .map(|raw| DataFrame::decode(&mut raw.as_slice()).unwrap())
        .collect();
    assert_eq!(
        frames.iter().map(|f| f.seq).collect::<Vec<_>>(),
        [1, 2, 3, 4]
    );
    assert!(frames[3].is_eot());
    assert!(frames[..3].iter().all(|f| f.payload == vec![b'A'; 28]));

    // Every chunk acknowledged once; the marker answered with the sequence
    // after its own.
    let acks = decode_acks(&ack_tap.lock().unwrap());
    assert!(acks.iter().all(|a| a.tag == AckTag::Ack));
    assert_eq!(acks.iter().map(|a| a.seq).collect::<Vec<_>>(), [1, 2, 3, 5]);
}

#[test]
fn lost_ack_triggers_duplicate_reack() {
    let config = test_config();
    let blob = vec![b'A'; 84];

    let (mut tx, mut rx) = loopback_pair();
    let mut dropped = false;
    let ack_tap = tap_with_fault(&mut rx, move |_, frame| {
        let ack = AckFrame::decode(&mut &frame[..]).unwrap();
        if !dropped && ack.seq == 2 {
            dropped = true;
            return FaultAction::Drop;
        }
        FaultAction::Pass
    });

    let (sent, received) = stop_wait_transfer(&config, &blob, tx, rx);
    sent.unwrap();
    assert_eq!(chunker::join(&received.unwrap()), blob);

    // The lost acknowledgement makes the peer resend chunk 2; the answer to
    // the duplicate carries the duplicate's own sequence, and the chunk is
    // kept only once (the blob above came out whole).
    let acks = decode_acks(&ack_tap.lock().unwrap());
    assert!(acks.iter().all(|a| a.tag == AckTag::Ack));
    assert_eq!(
        acks.iter().map(|a| a.seq).collect::<Vec<_>>(),
        [1, 2, 2, 3, 5]
    );
}

#[test]
fn corrupt_data_frame_is_error_flagged_and_resent() {
    let config = test_config();
    let blob = vec![b'A'; 84];

    let (mut tx, mut rx) = loopback_pair();
    // Flip one payload bit of chunk 2's first transmission, after the CRC
    // was computed.
    tap_with_fault(&mut tx, |count, frame| {
        if count == 2 {
            let mut corrupt = frame.to_vec();
            corrupt[5] ^= 0x01;
            return FaultAction::Replace(corrupt);
        }
        FaultAction::Pass
    });
    let ack_tap = tap(&mut rx);

    let (sent, received) = stop_wait_transfer(&config, &blob, tx, rx);
    sent.unwrap();
    assert_eq!(chunker::join(&received.unwrap()), blob);

    let acks = decode_acks(&ack_tap.lock().unwrap());
    let verdicts: Vec<(u16, AckTag)> = acks.iter().map(|a| (a.seq, a.tag)).collect();
    assert_eq!(
        verdicts,
        [
            (1, AckTag::Ack),
            (2, AckTag::Error),
            (2, AckTag::Ack),
            (3, AckTag::Ack),
            (5, AckTag::Ack),
        ]
    );
}

#[test]
fn clean_burst_transfer_and_wire_sequence() {
    let config = test_config();
    // 51 chunks: one carried by the alignment frame, then windows of
    // 20, 20 and 10.
    let blob: Vec<u8> = (0..51 * 28).map(|i| (i % 251) as u8).collect();
    let chunks = chunker::split(&blob, config.data_size);

    let (mut tx, mut rx) = loopback_pair();
    let data_tap = tap(&mut tx);
    let ack_tap = tap(&mut rx);

    let (sent, received) = burst_transfer(&config, &blob, tx, rx);
    sent.unwrap();
    assert_eq!(chunker::join(&received.unwrap()), blob);

    let frames = data_tap.lock().unwrap();
    assert_eq!(frames.len(), 53);

    let align = DataFrame::decode(&mut frames[0].as_slice()).unwrap();
    assert_eq!(align.seq, 1);
    assert_eq!(align.payload, chunks[0]);

    for (i, raw) in frames[1..51].iter().enumerate() {
        let frame = BurstFrame::decode(&mut raw.as_slice()).unwrap();
        assert_eq!(frame.payload, chunks[1 + i], "window frame {i}");
    }

    let eot = BurstFrame::decode(&mut frames[51].as_slice()).unwrap();
    assert_eq!(eot.eot_encoding().as_deref(), Some("UTF-8"));

    // The digest travels raw: 32 lowercase hex characters, one datagram.
    assert_eq!(frames[52], transfer_digest(&chunks));
    assert_eq!(frames[52].len(), 32);

    // One cumulative acknowledgement per window, then the final verdict.
    let acks = decode_acks(&ack_tap.lock().unwrap());
    assert!(acks.iter().all(|a| a.tag == AckTag::Ack));
    assert_eq!(
        acks.iter().map(|a| a.seq).collect::<Vec<_>>(),
        [1, 21, 41, 51, 51]
    );
}

#[test]
fn burst_digest_mismatch_restarts_the_transfer() {
    let config = test_config();
    let blob: Vec<u8> = (0..5 * 28).map(|i| (i % 251) as u8).collect();

    let (mut tx, mut rx) = loopback_pair();
    // Corrupt one window frame in a way the CRC cannot see: flip a payload
    // bit and restamp the checksum. Only the digest can catch this.
    tap_with_fault(&mut tx, |count, frame| {
        if count == 3 {
            let mut corrupt = frame.to_vec();
            corrupt[3] ^= 0x01;
            patch_crc(&mut corrupt);
            return FaultAction::Replace(corrupt);
        }
        FaultAction::Pass
    });
    let ack_tap = tap(&mut rx);

    let (sent, received) = burst_transfer(&config, &blob, tx, rx);
    sent.unwrap();
    assert_eq!(chunker::join(&received.unwrap()), blob);

    // The first pass was thrown away wholesale, so the peer re-aligned on
    // chunk 1 a second time.
    let acks = decode_acks(&ack_tap.lock().unwrap());
    assert_eq!(acks.iter().filter(|a| a.seq == 1).count(), 2);
}

#[test]
fn silent_peer_exhausts_the_alignment_budget() {
    let config = LinkConfig {
        align_timeout: Duration::from_millis(1),
        ..test_config()
    };
    let blob = vec![b'A'; 28];
    let chunks = chunker::split(&blob, config.data_size);

    // The peer's port exists but nobody ever listens.
    let (mut tx, _rx) = loopback_pair();
    let attempt_tap = tap(&mut tx);

    let result = BurstSender::new(&config, &mut tx).run(&chunks);
    assert!(matches!(result, Err(TransferError::PeerUnreachable)));
    assert_eq!(attempt_tap.lock().unwrap().len(), RETRY_LIMIT as usize);
}

#[test]
fn dead_line_after_first_chunk_exhausts_the_final_budget() {
    let config = LinkConfig {
        ack_timeout: Duration::from_millis(1),
        ..test_config()
    };
    let blob = vec![b'A'; 10];

    let (mut tx, rx) = loopback_pair();
    // Let the only chunk through, then cut the line for good: every marker
    // frame dies in flight.
    let attempt_tap = tap_with_fault(&mut tx, |_, frame| {
        let frame = DataFrame::decode(&mut &frame[..]).unwrap();
        if frame.seq == 1 {
            FaultAction::Pass
        } else {
            FaultAction::Drop
        }
    });

    let chunks = chunker::split(&blob, config.data_size);
    let rx_config = config.clone();
    let receiver = thread::spawn(move || {
        let mut rx = rx;
        StopWaitReceiver::new(&rx_config, &mut rx).run()
    });

    let result = StopWaitSender::new(&config, &mut tx).run(&chunks);
    assert!(matches!(result, Err(TransferError::PeerUnreachable)));
    // The marker burned its whole retry budget, not an attempt less.
    let marker_attempts = attempt_tap
        .lock()
        .unwrap()
        .iter()
        .filter(|raw| DataFrame::decode(&mut raw.as_slice()).unwrap().seq == 2)
        .count();
    assert_eq!(marker_attempts, RETRY_LIMIT as usize);

    // Hanging up the line sends the stranded receiver a fatal radio error.
    drop(tx);
    assert!(matches!(
        receiver.join().unwrap(),
        Err(TransferError::Radio(_))
    ));
}

#[test]
fn stop_wait_round_trips_blobs_of_every_shape() {
    let config = test_config();
    for len in [0usize, 1, 27, 28, 29, 84, 500] {
        let blob: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
        let (tx, rx) = loopback_pair();
        let (sent, received) = stop_wait_transfer(&config, &blob, tx, rx);
        sent.unwrap();
        assert_eq!(chunker::join(&received.unwrap()), blob, "blob of {len} bytes");
    }
}

#[test]
fn burst_round_trips_blobs_of_every_shape() {
    let config = test_config();
    for len in [0usize, 1, 28, 84, 560, 1429] {
        let blob: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
        let (tx, rx) = loopback_pair();
        let (sent, received) = burst_transfer(&config, &blob, tx, rx);
        sent.unwrap();
        assert_eq!(chunker::join(&received.unwrap()), blob, "blob of {len} bytes");
    }
}

#[test]
fn duplicate_data_frame_is_acknowledged_but_not_double_counted() {
    let config = test_config();
    let (mut injector, rx) = loopback_pair();
    injector.start_listening().unwrap();

    let rx_config = config.clone();
    let receiver = thread::spawn(move || {
        let mut rx = rx;
        StopWaitReceiver::new(&rx_config, &mut rx).run()
    });

    let chunk1 = vec![0x11; 28];
    let chunk2 = vec![0x22; 28];
    injector.send(&DataFrame::new(1, chunk1.clone()).to_bytes()).unwrap();
    injector.send(&DataFrame::new(1, chunk1.clone()).to_bytes()).unwrap();
    injector.send(&DataFrame::new(2, chunk2.clone()).to_bytes()).unwrap();
    injector
        .send(&DataFrame::new(3, EOT_PAYLOAD).to_bytes())
        .unwrap();

    let mut acks = Vec::new();
    for _ in 0..4 {
        let raw = injector.receive(Duration::from_millis(200)).unwrap();
        acks.push(AckFrame::decode(&mut raw.as_slice()).unwrap());
    }
    assert!(acks.iter().all(|a| a.tag == AckTag::Ack));
    assert_eq!(acks.iter().map(|a| a.seq).collect::<Vec<_>>(), [1, 1, 2, 4]);

    // The duplicate was answered but only one copy was kept.
    assert_eq!(receiver.join().unwrap().unwrap(), vec![chunk1, chunk2]);
}

#[test]
fn out_of_order_data_frame_is_dropped_without_answer() {
    let config = test_config();
    let (mut injector, rx) = loopback_pair();
    injector.start_listening().unwrap();

    let rx_config = config.clone();
    let receiver = thread::spawn(move || {
        let mut rx = rx;
        StopWaitReceiver::new(&rx_config, &mut rx).run()
    });

    let chunk = vec![0x33; 28];
    injector.send(&DataFrame::new(5, chunk.clone()).to_bytes()).unwrap();
    assert!(injector.receive(Duration::from_millis(50)).is_err());

    injector.send(&DataFrame::new(1, chunk.clone()).to_bytes()).unwrap();
    injector
        .send(&DataFrame::new(2, EOT_PAYLOAD).to_bytes())
        .unwrap();

    let mut acks = Vec::new();
    for _ in 0..2 {
        let raw = injector.receive(Duration::from_millis(200)).unwrap();
        acks.push(AckFrame::decode(&mut raw.as_slice()).unwrap());
    }
    assert_eq!(acks.iter().map(|a| a.seq).collect::<Vec<_>>(), [1, 3]);
    assert_eq!(receiver.join().unwrap().unwrap(), vec![chunk]);
}

#[test]
fn session_moves_a_file_end_to_end() {
    let config = test_config();
    let dir = tempfile::tempdir().unwrap();
    let in_path = dir.path().join("input.bin");
    let out_path = dir.path().join("output.bin");

    let payload: Vec<u8> = (0..300u16).map(|i| (i * 7) as u8).collect();
    std::fs::write(&in_path, &payload).unwrap();

    let (tx, rx) = loopback_pair();
    let rx_config = config.clone();
    let out = out_path.clone();
    let receiver = thread::spawn(move || {
        let mut session = Session::new(rx_config, Variant::StopWait, rx);
        session.receive_blob(&mut FileSink::new(out))
    });

    let mut session = Session::new(config, Variant::StopWait, tx);
    assert!(session.send_blob(&mut FileSource::new(&in_path)));
    assert!(receiver.join().unwrap());

    assert_eq!(std::fs::read(&out_path).unwrap(), payload);
}

#[test]
fn session_moves_a_compressed_file_end_to_end() {
    if std::process::Command::new("7z").arg("i").output().is_err() {
        return; // archiver not installed on this machine
    }

    let config = test_config();
    let dir = tempfile::tempdir().unwrap();
    let raw = dir.path().join("file.txt");
    std::fs::write(&raw, b"highly repetitive payload\n".repeat(128)).unwrap();

    let tx_archive = dir.path().join("file.7z");
    let rx_archive = dir.path().join("received.7z");
    let out_dir = dir.path().join("out");
    std::fs::create_dir(&out_dir).unwrap();

    let (tx, rx) = loopback_pair();
    let rx_config = config.clone();
    let sink_archive = rx_archive.clone();
    let sink_dir = out_dir.clone();
    let receiver = thread::spawn(move || {
        let mut session = Session::new(rx_config, Variant::Burst, rx);
        session.receive_blob(&mut CompressedFileSink::new(sink_archive, sink_dir))
    });

    let level = config.compression_level;
    let mut session = Session::new(config, Variant::Burst, tx);
    assert!(session.send_blob(&mut CompressedFileSource::new(&raw, &tx_archive, level)));
    assert!(receiver.join().unwrap());

    // The peer unpacked the archive it received; the original file comes
    // back byte for byte.
    assert_eq!(
        std::fs::read(out_dir.join("file.txt")).unwrap(),
        std::fs::read(&raw).unwrap()
    );
}
