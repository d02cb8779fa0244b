//! Basic mirror example demonstrating full sync runs over a folder pair

use anyhow::Result;
use mirror::{SyncEngine, SyncMode, SyncSettings};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    println!("Mirror Sync Example");
    println!("===================");

    // Create a temporary folder pair
    let temp_dir = tempfile::TempDir::new()?;
    let local_dir = temp_dir.path().join("local");
    let remote_dir = temp_dir.path().join("remote");

    tokio::fs::create_dir_all(&local_dir).await?;
    tokio::fs::create_dir_all(&remote_dir).await?;

    tokio::fs::write(local_dir.join("Prefs.json"), b"{\"font_size\": 12}").await?;
    tokio::fs::create_dir(local_dir.join("snippets")).await?;
    tokio::fs::write(
        local_dir.join("snippets").join("loop.snippet"),
        b"for i in 0..n {}",
    )
    .await?;

    println!("Local folder:  {}", local_dir.display());
    println!("Remote folder: {}", remote_dir.display());
    println!();

    let settings = SyncSettings {
        local_folder: local_dir.clone(),
        sync_folder: remote_dir.clone(),
        ..Default::default()
    };
    let engine = SyncEngine::new(settings);

    // Example 1: Initial push
    println!("Example 1: Initial Push");
    println!("-----------------------");

    let report = engine.run(SyncMode::Push, false).await?;
    println!("Files copied:  {}", report.applied);
    println!("Files deleted: {}", report.deleted);
    println!("Failures:      {}", report.failed);

    assert!(remote_dir.join("Prefs.json").exists());
    assert!(remote_dir.join("snippets").join("loop.snippet").exists());
    println!();

    // Example 2: Nothing to do on a second run
    println!("Example 2: Idempotent Re-Run");
    println!("----------------------------");

    let report = engine.run(SyncMode::Push, false).await?;
    println!("Changes on the second run: {}", report.total_changes());
    assert_eq!(report.total_changes(), 0);
    println!();

    // Example 3: Delete propagation
    println!("Example 3: Delete Propagation");
    println!("-----------------------------");

    tokio::fs::remove_file(local_dir.join("snippets").join("loop.snippet")).await?;
    let report = engine.run(SyncMode::Push, false).await?;
    println!("Files deleted: {}", report.deleted);

    assert!(!remote_dir.join("snippets").join("loop.snippet").exists());
    // The emptied directory is pruned as well
    assert!(!remote_dir.join("snippets").exists());
    println!();

    // Example 4: Pulling a remote edit
    println!("Example 4: Pulling a Remote Edit");
    println!("--------------------------------");

    tokio::fs::write(remote_dir.join("Prefs.json"), b"{\"font_size\": 14}").await?;

    // Stamp the remote edit clearly newer than the local copy
    let metadata = tokio::fs::metadata(local_dir.join("Prefs.json")).await?;
    let local_mtime = filetime::FileTime::from_last_modification_time(&metadata);
    let bumped = filetime::FileTime::from_unix_time(local_mtime.unix_seconds() + 5, 0);
    filetime::set_file_mtime(remote_dir.join("Prefs.json"), bumped)?;

    let report = engine.run(SyncMode::Pull, false).await?;
    println!("Files copied: {}", report.applied);

    let contents = tokio::fs::read_to_string(local_dir.join("Prefs.json")).await?;
    assert_eq!(contents, "{\"font_size\": 14}");
    println!();

    println!("All examples completed successfully!");

    Ok(())
}
