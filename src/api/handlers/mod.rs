mod admin;
mod uploads;

pub use admin::{health, sweep_chunks};
pub use uploads::{combine_upload, delete_upload, upload_file};
