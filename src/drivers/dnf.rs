use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::sync::LazyLock;

use common::DriverParseError;
use regex::Regex;

use super::PackageManagerDriver;
use crate::types::PackageManager;
use crate::version::compare_evr;

/// `name=version`, both restricted to characters RPM allows
static NAME_VERSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z0-9][A-Za-z0-9_.+-]*)=([A-Za-z0-9_.:+~^-]+)$")
        .expect("name=version pattern is valid")
});

/// DNF package manager driver (Fedora, RHEL 8+, CentOS Stream, etc.)
pub struct DnfDriver;

impl PackageManagerDriver for DnfDriver {
    fn package_manager(&self) -> PackageManager {
        PackageManager::Dnf
    }

    fn parse_pin(&self, token: &str) -> Option<(String, String)> {
        let token = token.trim_matches(|c| c == '"' || c == '\'');
        let captures = NAME_VERSION.captures(token)?;
        Some((captures[1].to_string(), captures[2].to_string()))
    }

    fn build_query_command(&self, packages: &BTreeSet<String>) -> String {
        // --latest-limit=1 keeps one version per name.arch; the explicit \n is
        // needed by dnf5 and produces blank lines on dnf4, which are skipped
        let names: Vec<String> = packages.iter().map(|name| shell_quote(name)).collect();
        format!(
            "dnf repoquery --quiet --latest-limit=1 --queryformat='%{{name}}=%{{version}}\\n' {}",
            names.join(" ")
        )
    }

    fn parse_query_output(&self, raw: &str) -> Result<HashMap<String, String>, DriverParseError> {
        /*
        Example output:
        curl=8.2.1
        make=4.4.1
        glibc=2.38
        glibc=2.38
        */

        let mut latest: HashMap<String, String> = HashMap::new();
        let mut unrecognized = Vec::new();

        for line in raw.lines().map(str::trim).filter(|line| !line.is_empty()) {
            let Some(captures) = NAME_VERSION.captures(line) else {
                unrecognized.push(line);
                continue;
            };

            let name = &captures[1];
            let version = &captures[2];

            // Multi-arch repos list a package once per arch
            match latest.get(name) {
                Some(existing) if compare_evr(existing, version) != Ordering::Less => {}
                _ => {
                    latest.insert(name.to_string(), version.to_string());
                }
            }
        }

        if latest.is_empty() && !unrecognized.is_empty() {
            return Err(DriverParseError {
                driver: self.name().to_string(),
                message: format!("no name=version lines, first line was '{}'", unrecognized[0]),
            });
        }

        Ok(latest)
    }

    fn compare_versions(&self, a: &str, b: &str) -> Ordering {
        compare_evr(a, b)
    }
}

fn shell_quote(value: &str) -> String {
    let safe = value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '+' | '-'));
    if safe {
        value.to_string()
    } else {
        format!("'{}'", value.replace('\'', "'\\''"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pin() {
        let driver = DnfDriver;

        assert_eq!(
            driver.parse_pin("python3=3.9.5"),
            Some(("python3".to_string(), "3.9.5".to_string()))
        );
        assert_eq!(
            driver.parse_pin("\"gcc-c++=11.2.1-9.fc35\""),
            Some(("gcc-c++".to_string(), "11.2.1-9.fc35".to_string()))
        );
        assert_eq!(
            driver.parse_pin("vim-enhanced=2:9.0.2120"),
            Some(("vim-enhanced".to_string(), "2:9.0.2120".to_string()))
        );
        assert_eq!(driver.parse_pin("curl"), None);
        assert_eq!(driver.parse_pin("curl=$CURL_VERSION"), None);
        assert_eq!(driver.parse_pin("=1.0"), None);
        assert_eq!(driver.parse_pin("curl="), None);
    }

    #[test]
    fn test_build_query_command() {
        let driver = DnfDriver;
        let packages: BTreeSet<String> =
            ["nginx", "python3"].iter().map(|s| s.to_string()).collect();

        assert_eq!(
            driver.build_query_command(&packages),
            "dnf repoquery --quiet --latest-limit=1 --queryformat='%{name}=%{version}\\n' nginx python3"
        );
    }

    #[test]
    fn test_parse_dnf_output() {
        let driver = DnfDriver;
        let output = "curl=8.2.1\n\nmake=4.4.1\nglibc=2.37\nglibc=2.38\nglibc=2.38\n";

        let latest = driver.parse_query_output(output).unwrap();

        assert_eq!(latest.len(), 3);
        assert_eq!(latest["curl"], "8.2.1");
        assert_eq!(latest["make"], "4.4.1");
        assert_eq!(latest["glibc"], "2.38");
    }

    #[test]
    fn test_parse_output_with_noise() {
        let driver = DnfDriver;
        let output = "Updating and loading repositories:\nRepositories loaded.\ncurl=8.2.1\n";

        let latest = driver.parse_query_output(output).unwrap();
        assert_eq!(latest.len(), 1);
    }

    #[test]
    fn test_parse_empty_output() {
        let driver = DnfDriver;
        assert!(driver.parse_query_output("").unwrap().is_empty());
    }

    #[test]
    fn test_parse_unrecognized_output() {
        let driver = DnfDriver;
        let output = "Error: Unknown argument \"--latest-limit=1\" for command \"repoquery\".\n";

        let err = driver.parse_query_output(output).unwrap_err();
        assert_eq!(err.driver, "dnf");
        assert!(err.message.contains("Unknown argument"));
    }

    #[test]
    fn test_rpm_ordering() {
        let driver = DnfDriver;
        assert_eq!(driver.compare_versions("3.9.5", "3.9.18"), Ordering::Less);
        assert_eq!(driver.compare_versions("1.20.1", "1.20.1"), Ordering::Equal);
    }
}
