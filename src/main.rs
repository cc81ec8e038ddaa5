//! Files provider - Entry Point
//!
//! Initialises the sandbox described by the configuration and prints the
//! content of one virtual directory.

use std::process::ExitCode;

use log::info;

use wiki_files_provider::error::handlers::handle_error;
use wiki_files_provider::utils::logging::setup_logging;
use wiki_files_provider::{FilesStorageProvider, LocalFilesProvider, StorageConfig, StorageError};

fn main() -> ExitCode {
    setup_logging();

    match run(std::env::args().nth(1)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            handle_error(&e);
            ExitCode::FAILURE
        }
    }
}

fn run(directory: Option<String>) -> Result<(), StorageError> {
    let config = StorageConfig::load()?;
    info!("Using data directory {}", config.data_directory);

    let provider = LocalFilesProvider::new(config)?;
    let directory = directory.as_deref();

    for dir in provider.list_directories(directory)? {
        println!("{dir}");
    }
    for file in provider.list_files(directory)? {
        match provider.file_details(&file)? {
            Some(details) => println!("{file}\t{}\t{}", details.size, details.last_modified.to_rfc3339()),
            None => println!("{file}"),
        }
    }

    let pages = provider.pages_with_attachments()?;
    info!("{} page(s) with attachments", pages.len());
    for page in pages {
        println!("[{page}] {}", provider.list_page_attachments(&page)?.join(", "));
    }

    Ok(())
}
