use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

#[cfg(not(target_os = "windows"))]
use crate::error::Error;
use crate::error::Result;

/// One row of the system process table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessEntry {
    pub pid: u32,
    /// Executable file name, e.g. `Castle Story.exe`
    pub name: String,
    /// Full image path, when the process could be queried
    pub exe_path: Option<PathBuf>,
}

/// Pick the process running `expected_exe`.
///
/// An exact path match wins; paths compare case-insensitively with `/` and
/// `\` treated alike. Otherwise the first process with the same file name is
/// taken.
pub fn find_target_process(entries: &[ProcessEntry], expected_exe: &Path) -> Option<u32> {
    let expected = normalise(&expected_exe.to_string_lossy());
    let expected_name = expected.rsplit('/').next().filter(|n| !n.is_empty())?;

    entries
        .iter()
        .find(|e| {
            e.exe_path
                .as_ref()
                .is_some_and(|p| normalise(&p.to_string_lossy()) == expected)
        })
        .or_else(|| {
            entries
                .iter()
                .find(|e| e.name.to_lowercase() == expected_name)
        })
        .map(|e| e.pid)
}

fn normalise(path: &str) -> String {
    path.replace('\\', "/").trim_end_matches('/').to_lowercase()
}

/// Snapshot of running processes
#[cfg(target_os = "windows")]
pub fn list_processes() -> Result<Vec<ProcessEntry>> {
    use std::mem;

    use windows::Win32::Foundation::CloseHandle;
    use windows::Win32::System::Diagnostics::ToolHelp::{
        CreateToolhelp32Snapshot, PROCESSENTRY32W, Process32FirstW, Process32NextW,
        TH32CS_SNAPPROCESS,
    };
    use windows::Win32::System::Threading::{OpenProcess, PROCESS_QUERY_LIMITED_INFORMATION};

    use crate::memory::win32::{Snapshot, query_image_path, wide_to_string};

    // SAFETY: CreateToolhelp32Snapshot has no memory-safety preconditions.
    let snapshot = unsafe { CreateToolhelp32Snapshot(TH32CS_SNAPPROCESS, 0) }
        .map(Snapshot)
        .map_err(|e| std::io::Error::other(format!("process snapshot failed: {}", e)))?;

    let mut entry = PROCESSENTRY32W {
        dwSize: mem::size_of::<PROCESSENTRY32W>() as u32,
        ..Default::default()
    };

    let mut processes = Vec::new();
    // SAFETY: entry is properly sized and initialised for the toolhelp API.
    if unsafe { Process32FirstW(snapshot.0, &mut entry) }.is_err() {
        return Ok(processes);
    }
    loop {
        let pid = entry.th32ProcessID;
        // SAFETY: OpenProcess has no memory-safety preconditions; the handle
        // is closed right after the query.
        let exe_path = unsafe { OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, false, pid) }
            .ok()
            .and_then(|handle| {
                let path = query_image_path(handle);
                // SAFETY: handle was opened above and is closed once.
                let _ = unsafe { CloseHandle(handle) };
                path
            });

        processes.push(ProcessEntry {
            pid,
            name: wide_to_string(&entry.szExeFile),
            exe_path,
        });
        // SAFETY: as above.
        if unsafe { Process32NextW(snapshot.0, &mut entry) }.is_err() {
            break;
        }
    }
    Ok(processes)
}

#[cfg(not(target_os = "windows"))]
pub fn list_processes() -> Result<Vec<ProcessEntry>> {
    Err(Error::Unsupported("Process enumeration"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(pid: u32, name: &str, path: Option<&str>) -> ProcessEntry {
        ProcessEntry {
            pid,
            name: name.to_string(),
            exe_path: path.map(PathBuf::from),
        }
    }

    fn fixture() -> Vec<ProcessEntry> {
        vec![
            entry(4, "System", None),
            entry(1200, "explorer.exe", Some(r"C:\Windows\explorer.exe")),
            entry(
                3100,
                "Castle Story.exe",
                Some(r"D:\Old\Castle Story\Castle Story.exe"),
            ),
            entry(
                3300,
                "Castle Story.exe",
                Some(r"C:\Steam\steamapps\common\Castle Story\Castle Story.exe"),
            ),
        ]
    }

    #[test]
    fn test_exact_path_match_preferred() {
        let expected = Path::new("c:/steam/steamapps/common/castle story/Castle Story.exe");
        assert_eq!(find_target_process(&fixture(), expected), Some(3300));
    }

    #[test]
    fn test_file_name_fallback() {
        let expected = Path::new("E:/Games/Castle Story/Castle Story.exe");
        assert_eq!(find_target_process(&fixture(), expected), Some(3100));
    }

    #[test]
    fn test_file_name_match_without_path() {
        let entries = vec![entry(77, "castle story.exe", None)];
        assert_eq!(
            find_target_process(&entries, Path::new("Castle Story.exe")),
            Some(77)
        );
    }

    #[test]
    fn test_no_match() {
        assert_eq!(
            find_target_process(&fixture(), Path::new("C:/Games/Other.exe")),
            None
        );
        assert_eq!(find_target_process(&[], Path::new("Castle Story.exe")), None);
    }
}
