//! COM1 console, the hypervisor's only output device.

use core::fmt::{Arguments, Write};

use spin::Mutex;
use uart_16550::SerialPort;

const SERIAL_IO_PORT: u16 = 0x3F8;

lazy_static! {
    static ref SERIAL1: Mutex<SerialPort> = {
        let mut serial_port = unsafe { SerialPort::new(SERIAL_IO_PORT) };
        serial_port.init();
        Mutex::new(serial_port)
    };
}

pub fn putfmt(fmt: Arguments) {
    SERIAL1
        .lock()
        .write_fmt(fmt)
        .expect("Printing to serial failed");
}

/// Raw byte-sink interface for code that does not go through `fmt`.
#[allow(dead_code)]
pub fn write_bytes(bytes: &[u8]) {
    let mut port = SERIAL1.lock();
    for &b in bytes {
        port.send(b);
    }
}
