//! Reply texts and the Markdown-safety check applied before every send.

use std::{path::PathBuf, time::Duration};

use crate::{
    command::Command,
    errors::Error,
    ports::{AddOutcome, DiskUsage, LogEntry, MemoryUsage, RemoveOutcome, Torrent, TorrentStatus},
    Result,
};

pub const GITHUB_URL: &str = "https://github.com/meinside/telegram-remotecontrol-bot";

pub const MSG_DEFAULT: &str = "Input your command:";
pub const MSG_UNKNOWN_COMMAND: &str = "Unknown command.";
pub const MSG_UNPROCESSABLE_FILE: &str = "Unprocessable file format.";
pub const MSG_NO_CONTROLLABLE_SERVICES: &str = "No controllable services.";
pub const MSG_NO_LOGS: &str = "No saved logs.";
pub const MSG_SERVICE_TO_START: &str = "Select service to start:";
pub const MSG_SERVICE_TO_STOP: &str = "Select service to stop:";
pub const MSG_TORRENT_UPLOAD: &str = "Send magnet, url, or file of target torrent:";
pub const MSG_TORRENT_REMOVE: &str = "Send the id of torrent to remove from the list:";
pub const MSG_TORRENT_DELETE: &str =
    "Send the id of torrent to delete from the list and local storage:";
pub const MSG_NO_TORRENTS: &str = "No torrents.";
pub const MSG_CANCEL: &str = "Cancel";
pub const MSG_CANCELED: &str = "Canceled.";

// ============== Markdown ==============

/// True when `_`, `*` and `` ` `` each occur an even number of times.
///
/// Unbalanced text is sent without a parse mode so the transport never rejects it.
pub fn is_markdown_balanced(text: &str) -> bool {
    let even = |n: usize| n % 2 == 0;
    even(text.matches('_').count())
        && even(text.matches('*').count())
        && even(text.matches('`').count())
}

pub fn remove_markdown_chars(text: &str, replacement: &str) -> String {
    text.replace('*', replacement)
        .replace('_', replacement)
        .replace('`', replacement)
}

// ============== Sizes ==============

const KB: i64 = 1 << 10;
const MB: i64 = 1 << 20;
const GB: i64 = 1 << 30;
const TB: i64 = 1 << 40;

pub fn readable_size(n: i64) -> String {
    if n < KB {
        format!("{n}B")
    } else if n < MB {
        format!("{:.1}KB", n as f64 / KB as f64)
    } else if n < GB {
        format!("{:.1}MB", n as f64 / MB as f64)
    } else if n < TB {
        format!("{:.2}GB", n as f64 / GB as f64)
    } else {
        format!("{:.2}TB", n as f64 / TB as f64)
    }
}

// ============== Torrents ==============

pub fn status_glyph(status: TorrentStatus) -> &'static str {
    match status {
        TorrentStatus::Stopped => "⛔",
        TorrentStatus::QueuedToVerify => "⏳🔍",
        TorrentStatus::Verifying => "🔍",
        TorrentStatus::QueuedToDownload => "⏳📥",
        TorrentStatus::Downloading => "📥",
        TorrentStatus::QueuedToSeed => "⏳🌱",
        TorrentStatus::Seeding => "🌱",
        TorrentStatus::Unknown(_) => "❓",
    }
}

fn torrent_details(t: &Torrent) -> Vec<String> {
    match t.status {
        TorrentStatus::Seeding => {
            let mut details = vec![format!(
                "{} {}",
                status_glyph(t.status),
                readable_size(t.total_size)
            )];
            if t.rate_upload > 0 {
                details.push(format!("↑{}/s", readable_size(t.rate_upload)));
            }
            details
        }
        TorrentStatus::Downloading | TorrentStatus::Stopped => {
            let done = (t.total_size as f64 * t.percent_done) as i64;
            let mut details = vec![format!(
                "{} {}/{} ({:.2}%)",
                status_glyph(t.status),
                readable_size(done),
                readable_size(t.total_size),
                t.percent_done * 100.0
            )];
            let mut updown = Vec::new();
            if t.rate_download > 0 {
                updown.push(format!("↓{}/s", readable_size(t.rate_download)));
            }
            if t.rate_upload > 0 {
                updown.push(format!("↑{}/s", readable_size(t.rate_upload)));
            }
            if !updown.is_empty() {
                details.push(updown.join(" "));
            }
            details
        }
        _ => vec![status_glyph(t.status).to_string()],
    }
}

/// Render a non-empty torrent list.
pub fn torrent_list(torrents: &[Torrent]) -> String {
    let mut lines = Vec::with_capacity(torrents.len() + 2);
    for t in torrents {
        let name = remove_markdown_chars(&t.name, " ");
        if !t.error_string.is_empty() {
            lines.push(format!(
                "*{}*. _{}_\n  ┖ ({}) *{}*",
                t.id,
                name,
                readable_size(t.total_size),
                t.error_string
            ));
        } else {
            let details = torrent_details(t)
                .into_iter()
                .map(|d| format!("  ┖ {d}"))
                .collect::<Vec<_>>()
                .join("\n");
            lines.push(format!("*{}*. _{}_\n{}", t.id, name, details));
        }
    }
    lines.push("----".to_string());
    lines.push(format!("total {} torrent(s)", torrents.len()));
    lines.join("\n")
}

/// `/trlist` answer: the list, the empty message, or the error text itself.
pub fn torrent_list_reply(result: &Result<Vec<Torrent>>) -> String {
    match result {
        Ok(torrents) if torrents.is_empty() => MSG_NO_TORRENTS.to_string(),
        Ok(torrents) => torrent_list(torrents),
        Err(e) => e.to_string(),
    }
}

pub fn add_result(result: &Result<AddOutcome>) -> String {
    match result {
        Ok(AddOutcome::Added) => "Given torrent was successfully added to the list.".to_string(),
        Ok(AddOutcome::Duplicate) => "Duplicated torrent was given.".to_string(),
        Ok(AddOutcome::Rejected) => "Failed to add given torrent.".to_string(),
        Err(Error::MalformedResponse(body)) => format!("Malformed RPC server response: {body}"),
        Err(e) => format!("Failed to add given torrent: {e}"),
    }
}

pub fn remove_result(id: i64, delete_local_data: bool, result: &Result<RemoveOutcome>) -> String {
    match result {
        Ok(RemoveOutcome::Removed) if delete_local_data => {
            format!("Torrent id: {id} and its data were successfully deleted")
        }
        Ok(RemoveOutcome::Removed) => {
            format!("Torrent id: {id} was successfully removed from the list")
        }
        Ok(RemoveOutcome::Rejected) => "Failed to remove given torrent.".to_string(),
        Err(Error::MalformedResponse(body)) => format!("Malformed RPC server response: {body}"),
        Err(e) => format!("Failed to remove given torrent: {e}"),
    }
}

pub fn torrent_button_label(t: &Torrent) -> String {
    format!("{}. {}", t.id, t.name)
}

// ============== Services ==============

pub fn service_statuses(statuses: &[(String, String)]) -> String {
    statuses
        .iter()
        .map(|(service, status)| format!("┖ {service}: *{status}*\n"))
        .collect()
}

pub fn service_started(service: &str) -> String {
    format!("started service: {service}")
}

pub fn service_stopped(service: &str) -> String {
    format!("stopped service: {service}")
}

pub fn service_start_failed(service: &str, reason: &str) -> String {
    format!("failed to start service: {service} ({reason})")
}

pub fn service_stop_failed(service: &str, reason: &str) -> String {
    format!("failed to stop service: {service} ({reason})")
}

// ============== Informational ==============

pub fn help() -> String {
    format!(
        "
following commands are supported:

*for transmission*

{} : show torrent list
{} : add torrent with url or magnet
{} : remove torrent from list
{} : remove torrent and delete data

*for systemctl*

{} : show status of each service (systemctl is-active)
{} : start a service (systemctl start)
{} : stop a service (systemctl stop)

*others*

{} : show this bot's status
{} : show latest logs of this bot
{} : show privacy policy of this bot
{} : show this help message
",
        Command::TorrentList.tag(),
        Command::TorrentAdd.tag(),
        Command::TorrentRemove.tag(),
        Command::TorrentDelete.tag(),
        Command::ServiceStatus.tag(),
        Command::ServiceStart.tag(),
        Command::ServiceStop.tag(),
        Command::Status.tag(),
        Command::Logs.tag(),
        Command::Privacy.tag(),
        Command::Help.tag(),
    )
}

pub fn privacy_policy() -> String {
    format!("\nprivacy policy:\n\n{GITHUB_URL}/raw/master/PRIVACY.md\n")
}

pub fn uptime(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    let days = secs / 86_400;
    let hours = (secs % 86_400) / 3_600;
    format!("*{days}* day(s) *{hours}* hour(s)")
}

fn megabytes(n: u64) -> f64 {
    n as f64 / (1024.0 * 1024.0)
}

fn gigabytes(n: u64) -> f64 {
    n as f64 / (1024.0 * 1024.0 * 1024.0)
}

pub fn memory_usage(usage: &Result<MemoryUsage>) -> String {
    match usage {
        Ok(m) => format!(
            "rss *{:.1} MB*, virtual *{:.1} MB*",
            megabytes(m.resident_bytes),
            megabytes(m.virtual_bytes)
        ),
        Err(e) => format!("unavailable ({e})"),
    }
}

pub fn disk_usage(disks: &[(PathBuf, Result<DiskUsage>)]) -> String {
    disks
        .iter()
        .map(|(path, usage)| match usage {
            Ok(d) => format!(
                "  {}  all *{:.2} GB*, used *{:.2} GB*, free *{:.2} GB*",
                path.display(),
                gigabytes(d.total_bytes),
                gigabytes(d.used_bytes()),
                gigabytes(d.free_bytes)
            ),
            Err(e) => format!("{}: {e}", path.display()),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn status_report(
    version: &str,
    elapsed: Duration,
    memory: &Result<MemoryUsage>,
    disks: &[(PathBuf, Result<DiskUsage>)],
) -> String {
    format!(
        "app version: {version}\napp uptime: {}\napp memory usage: {}\nsystem disk usage:\n{}",
        uptime(elapsed),
        memory_usage(memory),
        disk_usage(disks)
    )
}

/// Entries are expected newest first.
pub fn logs(entries: &[LogEntry]) -> String {
    if entries.is_empty() {
        return MSG_NO_LOGS.to_string();
    }
    entries
        .iter()
        .map(|e| {
            format!(
                "{} {}: {}",
                e.created_at.format("%Y-%m-%d %H:%M:%S"),
                e.kind.as_str(),
                e.message
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// `stripped` has already had markdown characters removed.
pub fn unknown_command(stripped: &str) -> String {
    if stripped.is_empty() {
        MSG_UNKNOWN_COMMAND.to_string()
    } else {
        format!("*{stripped}*: {MSG_UNKNOWN_COMMAND}")
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::{messaging::types::Reply, ports::LogKind};

    fn torrent(id: i64, status: TorrentStatus) -> Torrent {
        Torrent {
            id,
            name: "ubuntu_24.04*iso".to_string(),
            status,
            percent_done: 0.5,
            total_size: 2 * GB,
            rate_download: 0,
            rate_upload: 0,
            error_string: String::new(),
        }
    }

    #[test]
    fn markdown_balance_counts_each_delimiter() {
        assert!(is_markdown_balanced("plain"));
        assert!(is_markdown_balanced("*a* _b_ `c`"));
        assert!(!is_markdown_balanced("a_b"));
        assert!(!is_markdown_balanced("*a"));
        assert!(!is_markdown_balanced("`"));
        // Only single-character counts matter, fences included.
        assert!(is_markdown_balanced("```x``` ``` `"));
        assert!(is_markdown_balanced("```x```"));
    }

    #[test]
    fn even_delimiter_counts_always_enable_markdown() {
        let samples = [
            "",
            "__",
            "**",
            "``",
            "_a_ *b* `c` _d_",
            "```x``` ``` `",
            "snake_case and another_one",
            "`` ** __ `` ** __",
        ];
        for text in samples {
            let even = |c: char| text.matches(c).count() % 2 == 0;
            assert!(even('_') && even('*') && even('`'), "{text}");
            assert!(is_markdown_balanced(text), "{text}");
            assert!(Reply::menu(text).markdown, "{text}");
        }
    }

    #[test]
    fn markdown_balance_is_deterministic() {
        let text = "┖ nginx: *active*\n";
        assert_eq!(is_markdown_balanced(text), is_markdown_balanced(text));
    }

    #[test]
    fn readable_size_boundaries() {
        assert_eq!(readable_size(0), "0B");
        assert_eq!(readable_size(1023), "1023B");
        assert_eq!(readable_size(1024), "1.0KB");
        assert_eq!(readable_size(1536), "1.5KB");
        assert_eq!(readable_size(MB), "1.0MB");
        assert_eq!(readable_size(3 * GB / 2), "1.50GB");
        assert_eq!(readable_size(2 * TB), "2.00TB");
    }

    #[test]
    fn torrent_list_renders_details_and_footer() {
        let mut seeding = torrent(2, TorrentStatus::Seeding);
        seeding.rate_upload = 2048;
        let mut broken = torrent(3, TorrentStatus::Stopped);
        broken.error_string = "tracker gone".to_string();

        let text = torrent_list(&[torrent(1, TorrentStatus::Downloading), seeding, broken]);
        let expected = "*1*. _ubuntu 24.04 iso_\n  ┖ 📥 1.00GB/2.00GB (50.00%)\n\
                        *2*. _ubuntu 24.04 iso_\n  ┖ 🌱 2.00GB\n  ┖ ↑2.0KB/s\n\
                        *3*. _ubuntu 24.04 iso_\n  ┖ (2.00GB) *tracker gone*\n\
                        ----\ntotal 3 torrent(s)";
        assert_eq!(text, expected);
        assert!(is_markdown_balanced(&text));
    }

    #[test]
    fn queued_torrents_show_only_glyph() {
        let text = torrent_list(&[torrent(4, TorrentStatus::QueuedToSeed)]);
        assert!(text.contains("\n  ┖ ⏳🌱\n"));
        assert_eq!(status_glyph(TorrentStatus::Unknown(9)), "❓");
    }

    #[test]
    fn list_reply_handles_empty_and_errors() {
        assert_eq!(torrent_list_reply(&Ok(Vec::new())), MSG_NO_TORRENTS);
        assert_eq!(
            torrent_list_reply(&Err(Error::Rpc("no more retries for this request".into()))),
            "no more retries for this request"
        );
    }

    #[test]
    fn add_and_remove_texts() {
        assert_eq!(
            add_result(&Ok(AddOutcome::Duplicate)),
            "Duplicated torrent was given."
        );
        assert_eq!(
            add_result(&Err(Error::MalformedResponse("<html>".into()))),
            "Malformed RPC server response: <html>"
        );
        assert_eq!(
            add_result(&Err(Error::Rpc("HTTP 500".into()))),
            "Failed to add given torrent: HTTP 500"
        );
        assert_eq!(
            remove_result(7, false, &Ok(RemoveOutcome::Removed)),
            "Torrent id: 7 was successfully removed from the list"
        );
        assert_eq!(
            remove_result(7, true, &Ok(RemoveOutcome::Removed)),
            "Torrent id: 7 and its data were successfully deleted"
        );
    }

    #[test]
    fn status_report_layout() {
        let memory = Ok(MemoryUsage {
            resident_bytes: 3 * 1024 * 1024,
            virtual_bytes: 10 * 1024 * 1024,
        });
        let disks = vec![
            (
                PathBuf::from("/"),
                Ok(DiskUsage {
                    path: PathBuf::from("/"),
                    total_bytes: 4 << 30,
                    free_bytes: 1 << 30,
                }),
            ),
            (
                PathBuf::from("/mnt/x"),
                Err(Error::External("no such file".into())),
            ),
        ];
        let text = status_report(
            "1.2.3",
            Duration::from_secs(2 * 86_400 + 5 * 3_600 + 59),
            &memory,
            &disks,
        );
        assert_eq!(
            text,
            "app version: 1.2.3\n\
             app uptime: *2* day(s) *5* hour(s)\n\
             app memory usage: rss *3.0 MB*, virtual *10.0 MB*\n\
             system disk usage:\n  /  all *4.00 GB*, used *3.00 GB*, free *1.00 GB*\n\
             /mnt/x: external error: no such file"
        );
    }

    #[test]
    fn logs_are_rendered_in_given_order() {
        assert_eq!(logs(&[]), MSG_NO_LOGS);
        let entries = vec![
            LogEntry {
                kind: LogKind::Error,
                message: "boom".into(),
                created_at: Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 2).unwrap(),
            },
            LogEntry {
                kind: LogKind::Log,
                message: "starting server...".into(),
                created_at: Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 1).unwrap(),
            },
        ];
        assert_eq!(
            logs(&entries),
            "2024-05-01 10:00:02 err: boom\n2024-05-01 10:00:01 log: starting server..."
        );
    }

    #[test]
    fn unknown_command_echo() {
        assert_eq!(unknown_command(""), "Unknown command.");
        assert_eq!(unknown_command("/foo"), "*/foo*: Unknown command.");
    }

    #[test]
    fn help_mentions_every_command_and_is_markdown_safe() {
        let text = help();
        for cmd in ["/trlist", "/tradd", "/servicestart", "/privacy", "/help"] {
            assert!(text.contains(cmd), "{cmd} missing");
        }
        assert!(is_markdown_balanced(&text));
        assert!(privacy_policy().contains("/raw/master/PRIVACY.md"));
    }
}
