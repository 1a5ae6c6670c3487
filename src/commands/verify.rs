//! Verify command

use sstflash_flash::worker::VerifyImage;
use sstflash_flash::{Executor, FlashError, FlashImage};
use sstflash_serial::Transport;
use std::path::Path;

use super::{read_file, run_operation, CmdResult};

/// Compare flash contents against `input`
///
/// With a bank the file is treated like `write-bank` input and zero padded;
/// otherwise it is compared from address 0 for its own length.
pub fn run_verify<T: Transport + 'static>(
    executor: Executor<T>,
    input: &Path,
    bank: Option<u8>,
) -> CmdResult {
    let data = read_file(input)?;
    if data.is_empty() {
        return Err(format!("{:?} is empty", input).into());
    }

    let (image, first_bank) = match bank {
        Some(bank) => (FlashImage::for_bank(&data)?, bank),
        None => (FlashImage::from(data), 0),
    };

    match run_operation(executor, VerifyImage { image, first_bank }) {
        Ok(()) => {
            println!("Verification passed");
            Ok(())
        }
        Err(e) => {
            if let Some(FlashError::VerificationFailed { mismatches }) =
                e.downcast_ref::<FlashError>()
            {
                for m in mismatches.iter().take(16) {
                    println!("  {}", m);
                }
                if mismatches.len() > 16 {
                    println!("  ... and {} more", mismatches.len() - 16);
                }
            }
            Err(e)
        }
    }
}
