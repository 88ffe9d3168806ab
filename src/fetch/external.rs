//! Out-of-process fetch strategies.
//!
//! Late rungs of the strategy ladder delegate to a system `curl`, a headless
//! Chrome render, or the operator pasting page source by hand. All of them
//! run outside the event loop (child processes or `spawn_blocking`) so a
//! slow external step never stalls concurrent fetches.

use std::io::Read;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

/// Fetch a URL by shelling out to the system `curl` binary.
///
/// Returns `None` when curl is missing, exits non-zero, produces no output
/// or overruns its time budget.
pub async fn curl_fetch(url: &str, user_agent: &str, timeout_secs: u64) -> Option<String> {
    let mut cmd = Command::new("curl");
    cmd.args([
        "-s",
        "-L",
        "--compressed",
        "-m",
        &timeout_secs.to_string(),
        "-A",
        user_agent,
        "-H",
        "Accept: text/html",
        url,
    ])
    .stdin(Stdio::null())
    .stdout(Stdio::piped())
    .stderr(Stdio::null())
    .kill_on_drop(true);

    let run = tokio::time::timeout(Duration::from_secs(timeout_secs + 15), async {
        cmd.output().await
    })
    .await;

    match run {
        Ok(Ok(output)) if output.status.success() && !output.stdout.is_empty() => {
            Some(String::from_utf8_lossy(&output.stdout).into_owned())
        }
        Ok(Ok(output)) => {
            log::debug!("curl exited with {} for {url}", output.status);
            None
        }
        Ok(Err(e)) => {
            log::debug!("curl spawn failed for {url}: {e}");
            None
        }
        Err(_) => {
            log::debug!("curl timed out for {url}");
            None
        }
    }
}

/// Locate a Chrome/Chromium binary via env vars, well-known paths and PATH.
pub fn resolve_chrome_binary() -> Option<PathBuf> {
    let env_candidates = ["GOOGLE_CHROME_BIN", "CHROME_BIN"]
        .iter()
        .filter_map(|var| std::env::var(var).ok())
        .map(PathBuf::from);

    let fixed_candidates = [
        "/usr/bin/google-chrome-stable",
        "/usr/bin/google-chrome",
        "/usr/bin/chromium",
        "/usr/bin/chromium-browser",
    ]
    .iter()
    .map(PathBuf::from);

    for candidate in env_candidates.chain(fixed_candidates) {
        if candidate.is_file() {
            return Some(candidate);
        }
    }

    ["google-chrome", "google-chrome-stable", "chromium"]
        .iter()
        .find_map(|name| find_in_path(name))
}

fn find_in_path(name: &str) -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(name))
        .find(|p| p.is_file())
}

/// Render a page with headless Chrome and return the serialized DOM.
///
/// Slow last resort: a fresh browser process per call, with a hard time
/// budget. Returns `None` on any failure.
pub async fn browser_fetch(url: &str, user_agent: &str, timeout_secs: u64) -> Option<String> {
    let chrome = resolve_chrome_binary()?;

    let mut cmd = Command::new(chrome);
    cmd.args([
        "--headless=new",
        "--no-sandbox",
        "--disable-gpu",
        "--disable-dev-shm-usage",
        "--virtual-time-budget=10000",
        "--dump-dom",
    ])
    .arg(format!("--user-agent={user_agent}"))
    .arg(url)
    .stdin(Stdio::null())
    .stdout(Stdio::piped())
    .stderr(Stdio::null())
    .kill_on_drop(true);

    let run = tokio::time::timeout(Duration::from_secs(timeout_secs), async {
        cmd.output().await
    })
    .await;

    match run {
        Ok(Ok(output)) if output.status.success() && !output.stdout.is_empty() => {
            Some(String::from_utf8_lossy(&output.stdout).into_owned())
        }
        Ok(Ok(_)) | Ok(Err(_)) => {
            log::debug!("Browser fetch failed for {url}");
            None
        }
        Err(_) => {
            log::debug!("Browser fetch timed out for {url}");
            None
        }
    }
}

/// Prompt the operator to paste page source for a URL that every automated
/// strategy failed on. Blocking; callers run it via `spawn_blocking`.
///
/// Returns `None` when the operator skips (EOF on empty input).
pub fn prompt_for_manual_input(url: &str) -> Option<String> {
    eprintln!("{}", "=".repeat(78));
    eprintln!("FETCH FAILED: MANUAL INTERVENTION REQUIRED");
    eprintln!("URL: {url}");
    eprintln!();
    eprintln!("Open the URL in a browser, view the page source, copy it all,");
    eprintln!("paste it here, then signal end-of-file (Ctrl+D, or Ctrl+Z then");
    eprintln!("Enter on Windows). Signal end-of-file on empty input to skip.");
    eprintln!("{}", "=".repeat(78));

    let mut content = String::new();
    if std::io::stdin().read_to_string(&mut content).is_err() {
        eprintln!("Skipped (read error).");
        return None;
    }

    let content = content.trim();
    if content.is_empty() {
        eprintln!("Skipped.");
        None
    } else {
        eprintln!("HTML received, continuing scan.");
        Some(content.to_string())
    }
}
