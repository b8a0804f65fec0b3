use std::path::Path;

use ezdl::{
    format::{load_hex, read_ihex, save_hex},
    transport::DummyProgrammer,
    ChipInfo, Connected, Error, Flashing, Mcu, ProgVoltage,
};

fn connected(dummy: &DummyProgrammer) -> Flashing<DummyProgrammer> {
    let dummy = dummy.clone();
    let mut flashing = Flashing::with_opener(move |_| Ok(dummy.clone()));
    let connected = flashing.connect("/dev/ttyUSB0").unwrap();
    assert!(matches!(connected, Connected::Established { .. }));
    flashing
}

fn firmware(len: usize) -> Vec<u8> {
    // a few erased cells in the middle, none at the end
    (0..len)
        .map(|i| if i % 97 == 5 { 0xff } else { (i * 7 % 251) as u8 })
        .collect()
}

fn write_firmware(dir: &Path, image: &[u8]) -> std::path::PathBuf {
    let path = dir.join("firmware.hex");
    save_hex(&path, image).unwrap();
    path
}

#[test]
fn connect_reports_title() {
    let dummy = DummyProgrammer::new(Mcu::At89c51);
    let mut flashing = Flashing::with_opener(move |_| Ok(dummy.clone()));

    match flashing.connect("/dev/ttyUSB0").unwrap() {
        Connected::Established { title } => assert_eq!(title, "EZDL AT89C5x programmer v1.2"),
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(
        flashing.connect("/dev/ttyUSB0"),
        Ok(Connected::AlreadyConnected)
    );
    assert!(flashing.is_connected());
    assert_eq!(flashing.device().as_deref(), Some("/dev/ttyUSB0"));
}

#[test]
fn chip_info() {
    let dummy = DummyProgrammer::new(Mcu::At89c52);
    let mut flashing = connected(&dummy);

    assert_eq!(
        flashing.get_info(),
        Ok(ChipInfo {
            mcu: Mcu::At89c52,
            prog_voltage: ProgVoltage::Low,
            non_blank_bytes: 0,
            byte_cursor: 0,
        })
    );
    let params = flashing.get_pgm_params().unwrap();
    assert_eq!(params.mcu_postfix, 52);
    assert!(flashing.get_help().unwrap().contains("commands:"));
}

#[test]
fn empty_socket() {
    let dummy = DummyProgrammer::empty();
    let mut flashing = connected(&dummy);

    assert_eq!(flashing.get_info(), Err(Error::ChipNotFound));
    assert!(!flashing.is_connected());
}

#[test]
fn unknown_chip_is_refused() {
    let dummy = DummyProgrammer::with_chip("89C2051-5V", 2048);
    let mut flashing = connected(&dummy);

    let before = dummy.bytes_received();
    assert_eq!(flashing.erase(), Err(Error::UnknownChip));
    // title probe and info query only
    assert_eq!(dummy.bytes_received() - before, 2);
}

#[test]
fn write_then_read_back() {
    let dir = tempfile::tempdir().unwrap();
    let image = firmware(1000);
    let src = write_firmware(dir.path(), &image);

    let dummy = DummyProgrammer::new(Mcu::At89c51);
    let mut flashing = connected(&dummy);
    flashing.write(&src).unwrap();
    assert_eq!(&dummy.memory()[..image.len()], &image[..]);

    let dst = dir.path().join("readback.hex");
    flashing.read(&dst).unwrap();
    // the rest of the chip is erased and is not persisted
    assert_eq!(load_hex(&dst).unwrap(), image);
    assert!(flashing.is_connected());
}

#[test]
fn read_explicit_length() {
    let dir = tempfile::tempdir().unwrap();
    let dummy = DummyProgrammer::new(Mcu::At89c55);
    for (i, b) in [0x02u8, 0x00, 0x30, 0xff, 0x75].into_iter().enumerate() {
        dummy.set_memory_byte(i, b);
    }
    let mut flashing = connected(&dummy);

    assert_eq!(
        flashing.read_memory(Some(6)).unwrap(),
        [0x02, 0x00, 0x30, 0xff, 0x75, 0xff]
    );
    assert_eq!(flashing.read_memory(None).unwrap().len(), 20480);

    let dst = dir.path().join("head.hex");
    flashing.read_len(&dst, 3).unwrap();
    let text = std::fs::read_to_string(&dst).unwrap();
    assert_eq!(read_ihex(&text).unwrap(), [0x02, 0x00, 0x30]);
}

#[test]
fn verify_detects_a_flipped_byte() {
    let dir = tempfile::tempdir().unwrap();
    let image = firmware(300);
    let src = write_firmware(dir.path(), &image);

    let dummy = DummyProgrammer::new(Mcu::At89c52);
    let mut flashing = connected(&dummy);
    flashing.write(&src).unwrap();
    flashing.verify(&src).unwrap();

    dummy.set_memory_byte(123, !image[123]);
    assert_eq!(flashing.verify(&src), Err(Error::VerificationFailed));
    assert!(!flashing.is_connected());
    assert_eq!(flashing.disconnect(), Ok(()));
}

#[test]
fn verify_in_memory_image() {
    let dummy = DummyProgrammer::new(Mcu::At89c51);
    dummy.set_memory_byte(0, 0x12);
    let mut flashing = connected(&dummy);

    flashing.verify_image(&[0x12, 0xff]).unwrap();
    assert_eq!(
        flashing.verify_image(&[0x12, 0x34]),
        Err(Error::VerificationFailed)
    );
}

#[test]
fn oversized_image_is_rejected_before_erase() {
    let dir = tempfile::tempdir().unwrap();
    let src = write_firmware(dir.path(), &firmware(4097));

    let dummy = DummyProgrammer::new(Mcu::At89c51);
    dummy.set_memory_byte(0, 0x00);
    let mut flashing = connected(&dummy);

    assert_eq!(flashing.write(&src), Err(Error::WritingFailed));
    assert_eq!(dummy.memory()[0], 0x00);
}

#[test]
fn write_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let dummy = DummyProgrammer::new(Mcu::At89c51);
    let mut flashing = connected(&dummy);

    assert_eq!(
        flashing.write(dir.path().join("missing.hex")),
        Err(Error::FileNotExist)
    );
    assert!(!flashing.is_connected());
}

#[test]
fn checksum_cursor_erase_lock() {
    let dummy = DummyProgrammer::new(Mcu::At89c51);
    dummy.set_memory_byte(0, 0x10);
    dummy.set_memory_byte(1, 0x20);
    let mut flashing = connected(&dummy);

    flashing.set_cursor(2).unwrap();
    assert_eq!(dummy.cursor(), 2);
    assert_eq!(flashing.get_checksum(), Ok(0x30));

    flashing.lock().unwrap();
    assert!(dummy.is_locked());

    flashing.erase().unwrap();
    assert!(dummy.memory().iter().all(|&b| b == 0xff));
    assert!(!dummy.is_locked());
}

#[test]
fn disconnected_operations_send_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let src = write_firmware(dir.path(), &firmware(16));

    let dummy = DummyProgrammer::new(Mcu::At89c51);
    let mut flashing = connected(&dummy);
    flashing.disconnect().unwrap();
    assert!(!flashing.is_connected());

    let before = dummy.bytes_received();
    assert_eq!(flashing.get_title(), Err(Error::ProgrammerDisconnected));
    assert_eq!(flashing.get_info(), Err(Error::ProgrammerDisconnected));
    assert_eq!(flashing.get_pgm_params(), Err(Error::ProgrammerDisconnected));
    assert_eq!(flashing.get_checksum(), Err(Error::ProgrammerDisconnected));
    assert_eq!(flashing.set_cursor(1), Err(Error::ProgrammerDisconnected));
    assert_eq!(flashing.erase(), Err(Error::ProgrammerDisconnected));
    assert_eq!(flashing.lock(), Err(Error::ProgrammerDisconnected));
    assert_eq!(flashing.write(&src), Err(Error::ProgrammerDisconnected));
    assert_eq!(
        flashing.read(dir.path().join("out.hex")),
        Err(Error::ProgrammerDisconnected)
    );
    assert_eq!(flashing.verify(&src), Err(Error::ProgrammerDisconnected));
    assert_eq!(dummy.bytes_received(), before);

    assert_eq!(flashing.disconnect(), Ok(()));
}

#[test]
fn failure_tears_down_the_session() {
    let dummy = DummyProgrammer::new(Mcu::At89c51);
    let mut flashing = connected(&dummy);

    assert_eq!(flashing.set_cursor(123_456), Err(Error::CounterEncodingFailed));
    assert!(!flashing.is_connected());
    assert_eq!(flashing.disconnect(), Ok(()));

    // a fresh connect works again
    assert!(matches!(
        flashing.connect("/dev/ttyUSB0"),
        Ok(Connected::Established { .. })
    ));
    assert_eq!(flashing.set_cursor(10), Ok(()));
}

#[test]
fn close_failure_still_disconnects() {
    let dummy = DummyProgrammer::new(Mcu::At89c51);
    let mut flashing = connected(&dummy);

    dummy.set_fail_close(true);
    assert_eq!(flashing.disconnect(), Err(Error::DisconnectionError));
    assert_eq!(flashing.disconnect(), Ok(()));
    assert_eq!(flashing.get_title(), Err(Error::ProgrammerDisconnected));
}

#[test]
fn save_omits_erased_cells() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sparse.hex");
    let image = [0xff, 0xff, 0x01, 0xff, 0x02, 0xff];
    save_hex(&path, &image).unwrap();

    let loaded = load_hex(&path).unwrap();
    assert_eq!(loaded.len(), 5);
    for (offset, &b) in image.iter().enumerate().filter(|(_, b)| **b != 0xff) {
        assert_eq!(loaded[offset], b);
    }
    assert_eq!(loaded[3], 0xff);
}

/// Lets the guards pass, then pulls the cable after `budget` more bytes.
fn link_drops_after(guard_bytes: usize, budget: usize) -> Flashing<DummyProgrammer> {
    let dummy = DummyProgrammer::new(Mcu::At89c51);
    let flashing = connected(&dummy);
    dummy.fail_after(guard_bytes + budget);
    flashing
}

#[test]
fn link_loss_maps_to_the_failing_step() {
    // title guard only
    let mut flashing = link_drops_after(1, 0);
    assert_eq!(flashing.get_title(), Err(Error::GettingTitleFailed));
    assert!(!flashing.is_connected());

    let mut flashing = link_drops_after(1, 0);
    assert_eq!(flashing.get_info(), Err(Error::GettingInfoDataFailed));
    assert!(!flashing.is_connected());

    // title and info guards
    let mut flashing = link_drops_after(2, 0);
    assert_eq!(flashing.get_pgm_params(), Err(Error::GettingPgmDataFailed));
    assert!(!flashing.is_connected());

    let mut flashing = link_drops_after(2, 0);
    assert_eq!(flashing.get_checksum(), Err(Error::GettingChecksumFailed));
    assert!(!flashing.is_connected());

    let mut flashing = link_drops_after(2, 0);
    assert_eq!(flashing.erase(), Err(Error::ErasingFailed));
    assert!(!flashing.is_connected());

    let mut flashing = link_drops_after(2, 0);
    assert_eq!(flashing.lock(), Err(Error::LockingFailed));
    assert!(!flashing.is_connected());
}

#[test]
fn link_loss_inside_counter_payload() {
    // opcode and first digit go out, the second digit does not
    let dummy = DummyProgrammer::new(Mcu::At89c52);
    let mut flashing = connected(&dummy);
    dummy.fail_after(2 + 2);

    assert_eq!(flashing.set_cursor(42), Err(Error::SetCursorFailed));
    assert!(!flashing.is_connected());
    assert_eq!(dummy.cursor(), 0);
}

#[test]
fn link_loss_while_loading_firmware() {
    let dir = tempfile::tempdir().unwrap();
    let image = firmware(10);
    let path = write_firmware(dir.path(), &image);

    let dummy = DummyProgrammer::new(Mcu::At89c51);
    let mut flashing = connected(&dummy);
    // guards 2, info 1, "s10\n" 4, erase 1, then opcode and one image byte
    dummy.fail_after(2 + 1 + 4 + 1 + 2);

    assert_eq!(flashing.write(&path), Err(Error::WritingFailed));
    assert!(!flashing.is_connected());
    assert_eq!(dummy.memory()[0], image[0]);
    assert!(dummy.memory()[1..].iter().all(|&b| b == 0xff));
}

#[test]
fn link_loss_before_firmware_dump() {
    let dummy = DummyProgrammer::new(Mcu::At89c51);
    let mut flashing = connected(&dummy);
    // guards 2, info 1, "s16\n" 4, then the read opcode is lost
    dummy.fail_after(2 + 1 + 4);

    assert_eq!(flashing.read_memory(Some(16)), Err(Error::ReadingFailed));
    assert!(!flashing.is_connected());
    assert_eq!(dummy.cursor(), 16);
}

#[test]
fn malformed_firmware_dump() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dump.hex");
    let dummy = DummyProgrammer::new(Mcu::At89c51);
    let mut flashing = connected(&dummy);
    dummy.set_garbled_dump(true);

    assert_eq!(flashing.read(&path), Err(Error::ReadingFailed));
    assert!(!flashing.is_connected());
    assert!(!path.exists());
}
