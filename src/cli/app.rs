//! CLI module for the fleeting application
//!
//! This module maps subcommands onto the record storage and prints the
//! results for a terminal.
use std::{
    env, fs,
    io::{stdin, stdout, BufRead, IsTerminal, Read, Write},
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use log::{info, warn};
use tokio::{
    sync::Mutex,
    time::{self, MissedTickBehavior},
};

use crate::{
    extract_tags, require_content, BackupScheduler, BackupUnit, Commands, FleetingError, Record,
    RecordStorage, Result, SearchHit,
};

/// Environment variable consulted before prompting for the passphrase.
pub const PASSPHRASE_ENV: &str = "FLEETING_PASSPHRASE";

/// How often a running daemon re-reads the config file.
const CONFIG_POLL_PERIOD: Duration = Duration::from_secs(30);

/// CLI Application handler - processes CLI commands and interfaces with RecordStorage
pub struct App {
    /// The record storage backend
    storage: Arc<Mutex<RecordStorage>>,

    /// Whether to display full record bodies
    verbose: bool,
}

impl App {
    pub fn new(storage: Arc<Mutex<RecordStorage>>, verbose: bool) -> Self {
        Self { storage, verbose }
    }

    /// Run the CLI application with the given command
    pub async fn run(&self, command: Commands) -> Result<()> {
        match command {
            Commands::Months => self.list_months().await?,

            Commands::List {
                month,
                private,
                json,
            } => self.list_records(month, private, json).await?,

            Commands::Add { content, private } => self.add_record(content, private).await?,

            Commands::Edit {
                timestamp,
                content,
                month,
                private,
            } => self.edit_record(timestamp, content, month, private).await?,

            Commands::Delete {
                timestamp,
                month,
                private,
                force,
            } => self.delete_record(timestamp, month, private, force).await?,

            Commands::Search {
                query,
                private,
                limit,
                json,
            } => self.search(query, private, limit, json).await?,

            Commands::Tags { private } => self.list_tags(private).await?,

            Commands::History { timestamp } => self.show_history(timestamp).await?,

            Commands::UnlockCheck => {
                self.unlock().await?;
                println!("{}", console::style("Passphrase accepted.").green());
            }

            Commands::Attach { file } => self.attach(&file).await?,

            Commands::Backup => {
                if self.storage.lock().await.backup_now()? {
                    println!("Snapshot written.");
                } else {
                    println!("Nothing changed since the last snapshot.");
                }
            }

            Commands::Backups => self.list_backups().await?,

            Commands::Restore { id, force } => self.restore(id, force).await?,

            Commands::DeleteBackup { id } => {
                if self.storage.lock().await.delete_backup(&id)? {
                    println!("Snapshot {} deleted.", id);
                } else {
                    println!("No snapshot {}.", id);
                }
            }

            Commands::BackupConfig {
                interval,
                unit,
                keep,
            } => self.backup_config(interval, unit, keep).await?,

            Commands::Config { storage_dir } => self.config(storage_dir).await?,

            Commands::Daemon => self.run_daemon().await?,
        }

        Ok(())
    }

    async fn list_months(&self) -> Result<()> {
        let months = self.storage.lock().await.list_partitions()?;
        if months.is_empty() {
            println!("No records yet.");
        }
        for month in months {
            println!("{}", month);
        }
        Ok(())
    }

    async fn list_records(&self, month: Option<String>, private: bool, json: bool) -> Result<()> {
        let records = if private {
            self.unlock().await?;
            self.storage.lock().await.try_list_private_records()?
        } else {
            self.storage
                .lock()
                .await
                .list_records(month.as_deref(), false)?
        };

        if json {
            println!("{}", serde_json::to_string_pretty(&records)?);
            return Ok(());
        }
        if records.is_empty() {
            println!("No records found.");
            return Ok(());
        }
        let items: Vec<(Option<&str>, &Record)> = records.iter().map(|r| (None, r)).collect();
        self.display_records(&items);
        Ok(())
    }

    async fn add_record(&self, content: Option<String>, private: bool) -> Result<()> {
        let content = self.content_or_stdin(content)?;
        if private {
            self.unlock().await?;
        }
        let record = self
            .storage
            .lock()
            .await
            .add_record(require_content(&content)?, private)?;
        println!("Record added at {}", console::style(&record.timestamp).bold());
        Ok(())
    }

    async fn edit_record(
        &self,
        timestamp: String,
        content: Option<String>,
        month: Option<String>,
        private: bool,
    ) -> Result<()> {
        let content = self.content_or_stdin(content)?;
        if private {
            self.unlock().await?;
        }
        let month = month.or_else(|| month_of(&timestamp));
        let edited = self.storage.lock().await.edit_record(
            month.as_deref(),
            &timestamp,
            require_content(&content)?,
            private,
        )?;

        if edited {
            println!("Record {} updated.", timestamp);
        } else {
            println!("No record at {}.", timestamp);
        }
        Ok(())
    }

    async fn delete_record(
        &self,
        timestamp: String,
        month: Option<String>,
        private: bool,
        force: bool,
    ) -> Result<()> {
        if private {
            self.unlock().await?;
        }
        let month = month.or_else(|| month_of(&timestamp));

        if !force {
            println!("You are about to delete the record at {}.", timestamp);
            println!("\nThis action cannot be undone!");
            if !confirm("Are you sure you want to delete this record? [y/N]: ")? {
                println!("Deletion cancelled.");
                return Ok(());
            }
        }

        let deleted =
            self.storage
                .lock()
                .await
                .delete_record(month.as_deref(), &timestamp, private)?;
        if deleted {
            println!("Record {} has been permanently deleted.", timestamp);
        } else {
            println!("No record at {}.", timestamp);
        }
        Ok(())
    }

    async fn search(&self, query: String, private: bool, limit: usize, json: bool) -> Result<()> {
        if private {
            self.unlock().await?;
        }
        let mut results: Vec<SearchHit> =
            self.storage.lock().await.search_records(&query, private)?;

        // 0 means no limit
        if limit > 0 && results.len() > limit {
            results.truncate(limit);
        }

        if json {
            println!("{}", serde_json::to_string_pretty(&results)?);
            return Ok(());
        }

        if results.is_empty() {
            println!("No records found matching query: \"{}\"", query);
            return Ok(());
        }
        let items: Vec<(Option<&str>, &Record)> = results
            .iter()
            .map(|hit| (hit.month.as_deref(), &hit.record))
            .collect();
        self.display_records(&items);
        println!("\nFound {} matching records.", results.len());
        Ok(())
    }

    async fn list_tags(&self, private: bool) -> Result<()> {
        if private {
            self.unlock().await?;
        }
        let tags = self.storage.lock().await.list_tags(private)?;
        if tags.is_empty() {
            println!("No tags in use.");
        }
        for tag in tags {
            println!("{}", console::style(format!("#{}", tag)).cyan());
        }
        Ok(())
    }

    async fn show_history(&self, timestamp: String) -> Result<()> {
        let entries = self.storage.lock().await.get_history(&timestamp)?;
        if entries.is_empty() {
            println!("No history for {}.", timestamp);
            return Ok(());
        }
        let width = separator_width();
        for (i, entry) in entries.iter().enumerate() {
            if i > 0 {
                println!("{}", "-".repeat(width));
            }
            println!("Replaced: {}", console::style(&entry.edited_at).bold());
            println!("\n{}", entry.content);
        }
        Ok(())
    }

    async fn attach(&self, file: &Path) -> Result<()> {
        let extension = file
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or_default();
        let bytes = fs::read(file)?;
        let relative = self
            .storage
            .lock()
            .await
            .save_attachment(&bytes, extension)?;
        let name = file
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or("attachment");
        println!("![{}]({})", name, relative);
        Ok(())
    }

    async fn list_backups(&self) -> Result<()> {
        let snapshots = self.storage.lock().await.list_backups()?;
        if snapshots.is_empty() {
            println!("No snapshots.");
        }
        for snapshot in snapshots {
            println!(
                "{}  {}",
                console::style(&snapshot.id).bold(),
                snapshot.label
            );
        }
        Ok(())
    }

    async fn restore(&self, id: String, force: bool) -> Result<()> {
        if !force {
            println!("Restoring {} replaces everything in the data root.", id);
            if !confirm("Continue? [y/N]: ")? {
                println!("Restore cancelled.");
                return Ok(());
            }
        }
        if self.storage.lock().await.restore_backup(&id)? {
            println!("Restored snapshot {}.", id);
        } else {
            println!("No snapshot {}.", id);
        }
        Ok(())
    }

    async fn backup_config(
        &self,
        interval: Option<i64>,
        unit: Option<BackupUnit>,
        keep: Option<u32>,
    ) -> Result<()> {
        let mut storage = self.storage.lock().await;
        let mut schedule = storage.backup_config();

        if interval.is_some() || unit.is_some() || keep.is_some() {
            schedule = storage.set_backup_config(
                interval.unwrap_or(schedule.interval),
                unit.unwrap_or(schedule.unit),
                keep.unwrap_or(schedule.keep),
            )?;
        }

        match schedule.period() {
            Some(period) => println!(
                "Backups every {} {} ({}s)",
                schedule.interval,
                unit_name(schedule.unit),
                period.as_secs()
            ),
            None => println!("Scheduled backups disabled"),
        }
        println!("Keeping {} snapshots", schedule.keep.max(1));
        Ok(())
    }

    async fn config(&self, storage_dir: Option<PathBuf>) -> Result<()> {
        let mut storage = self.storage.lock().await;
        if let Some(dir) = storage_dir {
            let mut config = storage.global_config().clone();
            config.storage_dir = dir;
            storage.set_global_config(config)?;
            println!("Data root is now {}", storage.root().display());
        }
        println!(
            "{}",
            serde_json::to_string_pretty(storage.global_config())?
        );
        Ok(())
    }

    /// Runs scheduled backups until Ctrl-C. Schedule changes saved by other
    /// invocations are picked up on the next config poll.
    async fn run_daemon(&self) -> Result<()> {
        let mut schedule = self.storage.lock().await.backup_config();
        let mut scheduler = BackupScheduler::new(&self.storage);
        scheduler.reschedule(schedule).await?;

        if !scheduler.status().is_running {
            warn!("Backup interval is not positive; waiting for a schedule");
        }

        println!("Running scheduled backups. Press Ctrl-C to stop.");
        let shutdown = tokio::signal::ctrl_c();
        tokio::pin!(shutdown);
        let mut poll =
            time::interval_at(time::Instant::now() + CONFIG_POLL_PERIOD, CONFIG_POLL_PERIOD);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                result = &mut shutdown => {
                    result?;
                    info!("Interrupt received");
                    break;
                }
                _ = poll.tick() => {
                    let reloaded = self.storage.lock().await.reload_config();
                    match reloaded {
                        Ok(latest) if latest != schedule => {
                            info!("Backup schedule changed to {:?}", latest);
                            match scheduler.reschedule(latest).await {
                                Ok(()) => schedule = latest,
                                Err(e) => warn!("Keeping previous schedule: {}", e),
                            }
                        }
                        Ok(_) => {}
                        Err(e) => warn!("Failed to reload config: {}", e),
                    }
                }
            }
        }

        scheduler.stop().await
    }

    /// Unlocks the private space with the passphrase from the environment
    /// or a prompt.
    async fn unlock(&self) -> Result<()> {
        let passphrase = match env::var(PASSPHRASE_ENV) {
            Ok(value) => value,
            Err(_) => read_passphrase()?,
        };
        if self.storage.lock().await.unlock_private(&passphrase)? {
            Ok(())
        } else {
            Err(FleetingError::VaultAuthentication)
        }
    }

    fn content_or_stdin(&self, content: Option<String>) -> Result<String> {
        match content {
            Some(content) => Ok(content),
            None => {
                let mut buffer = String::new();
                stdin().read_to_string(&mut buffer)?;
                Ok(buffer)
            }
        }
    }

    /// Display records in text format
    fn display_records(&self, records: &[(Option<&str>, &Record)]) {
        let width = separator_width();

        for (i, (month, record)) in records.iter().enumerate() {
            if i > 0 {
                println!("{}", "-".repeat(width));
            }

            match month {
                Some(month) => println!(
                    "{} ({})",
                    console::style(&record.timestamp).bold(),
                    month
                ),
                None => println!("{}", console::style(&record.timestamp).bold()),
            }

            let tags = extract_tags(&record.content);
            if !tags.is_empty() {
                let tags = tags
                    .iter()
                    .map(|tag| format!("#{}", tag))
                    .collect::<Vec<_>>()
                    .join(" ");
                println!("Tags: {}", console::style(tags).cyan());
            }

            if self.verbose {
                println!("\n{}", record.content);
            } else {
                let preview = content_preview(&record.content, 100);
                if !preview.is_empty() {
                    println!("\n{}", preview);
                }
            }
        }
    }
}

fn unit_name(unit: BackupUnit) -> &'static str {
    match unit {
        BackupUnit::Hours => "hours",
        BackupUnit::Days => "days",
    }
}

fn month_of(timestamp: &str) -> Option<String> {
    timestamp.get(..7).map(str::to_string)
}

fn separator_width() -> usize {
    terminal_size::terminal_size()
        .map(|(w, _)| w.0 as usize)
        .unwrap_or(80)
        .min(50)
}

/// First non-empty line, cut at `max_chars`.
fn content_preview(content: &str, max_chars: usize) -> String {
    let first_line = content
        .lines()
        .find(|line| !line.trim().is_empty())
        .unwrap_or("");

    if first_line.chars().count() <= max_chars {
        first_line.to_string()
    } else {
        let cut: String = first_line.chars().take(max_chars).collect();
        format!("{}...", cut)
    }
}

fn prompt(message: &str) -> Result<String> {
    print!("{}", message);
    stdout().flush().map_err(FleetingError::Io)?;
    let mut input = String::new();
    stdin().read_line(&mut input).map_err(FleetingError::Io)?;
    Ok(input.trim_end_matches(['\r', '\n']).to_string())
}

/// Reads the passphrase without echo when a person is at the terminal,
/// otherwise takes one line from stdin.
fn read_passphrase() -> Result<String> {
    if console::user_attended_stderr() && stdin().is_terminal() {
        let term = console::Term::stderr();
        term.write_str("Passphrase: ")?;
        return Ok(term.read_secure_line()?);
    }
    read_passphrase_from(&mut stdin().lock())
}

/// One line without its line ending. Surrounding spaces are part of the
/// passphrase.
fn read_passphrase_from(reader: &mut impl BufRead) -> Result<String> {
    let mut line = String::new();
    reader.read_line(&mut line)?;
    let passphrase = line
        .strip_suffix('\n')
        .map(|rest| rest.strip_suffix('\r').unwrap_or(rest))
        .unwrap_or(&line);
    Ok(passphrase.to_string())
}

fn confirm(message: &str) -> Result<bool> {
    let input = prompt(message)?.trim().to_lowercase();
    Ok(input == "y" || input == "yes")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn piped_passphrase_keeps_surrounding_spaces() {
        let mut input = Cursor::new(" correct horse \r\nsecond line\n");
        assert_eq!(read_passphrase_from(&mut input).unwrap(), " correct horse ");

        let mut input = Cursor::new("no newline");
        assert_eq!(read_passphrase_from(&mut input).unwrap(), "no newline");
    }

    #[test]
    fn preview_takes_first_non_blank_line() {
        assert_eq!(content_preview("\n\n  \nhello\nworld", 100), "hello");
        assert_eq!(content_preview("", 10), "");
    }

    #[test]
    fn preview_cuts_on_char_boundaries() {
        assert_eq!(content_preview("ééééé", 3), "ééé...");
    }

    #[test]
    fn month_comes_from_timestamp_prefix() {
        assert_eq!(month_of("2026-10-17 08:00:00").as_deref(), Some("2026-10"));
        assert_eq!(month_of("bad"), None);
    }
}
