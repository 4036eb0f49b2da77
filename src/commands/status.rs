//! Status code lookup.

use hid_element::Status;

/// Print the name of `code`, or the table of named codes
pub fn run(code: Option<u32>) {
    match code {
        Some(code) => {
            let status = Status::from_raw(code);
            println!("{status}");
            if let Status::Other(_) = status {
                println!("  not a known transport status");
            }
        }
        None => {
            println!("{:<12} Name", "Code");
            for status in Status::NAMED {
                println!("0x{:08X}   {}", status.raw(), status.name());
            }
        }
    }
}
