use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

use crate::consts::{KNOWN_ARCH, KNOWN_OS, MAX_GO_RELEASE, RELEASE_TAG_REGEX, UNIX_OS};
use crate::error::{Error, ErrorKind};

/// An (operating system, architecture) pair that packages are loaded for.
///
/// The set is closed and ordered: [`BuildContext::ALL`] lists every member in
/// priority order, and the derived ordering follows it, so the first context
/// in which a directory yields a package is its default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BuildContext {
    LinuxAmd64,
    WindowsAmd64,
    DarwinAmd64,
    JsWasm,
}

impl BuildContext {
    pub const ALL: [BuildContext; 4] = [Self::LinuxAmd64, Self::WindowsAmd64, Self::DarwinAmd64, Self::JsWasm];

    pub fn goos(&self) -> &'static str {
        match self {
            Self::LinuxAmd64 => "linux",
            Self::WindowsAmd64 => "windows",
            Self::DarwinAmd64 => "darwin",
            Self::JsWasm => "js",
        }
    }

    pub fn goarch(&self) -> &'static str {
        match self {
            Self::LinuxAmd64 | Self::WindowsAmd64 | Self::DarwinAmd64 => "amd64",
            Self::JsWasm => "wasm",
        }
    }

    /// Whether cgo is available, which decides the `cgo` tag and whether
    /// files importing `"C"` are part of the package.
    pub fn cgo_enabled(&self) -> bool {
        !matches!(self, Self::JsWasm)
    }

    /// Returns `true` if the build tag `tag` is satisfied in this context.
    pub fn matches_tag(&self, tag: &str) -> bool {
        if tag == self.goos() || tag == self.goarch() || tag == "gc" {
            return true;
        }
        match tag {
            "unix" => UNIX_OS.contains(&self.goos()),
            "cgo" => self.cgo_enabled(),
            _ => RELEASE_TAG_REGEX
                .captures(tag)
                .and_then(|c| c[1].parse::<u32>().ok())
                .is_some_and(|minor| minor >= 1 && minor <= MAX_GO_RELEASE),
        }
    }

    /// Returns `true` if the `_GOOS`, `_GOARCH` or `_GOOS_GOARCH` suffix of a
    /// Go file name (if any) is satisfied in this context.
    ///
    /// Everything before the first `_` is ignored, so `windows.go` is
    /// unconstrained while `x_windows.go` and `x_windows_test.go` are not.
    pub fn matches_file_name(&self, name: &str) -> bool {
        let name = name.strip_suffix(".go").unwrap_or(name);
        let Some(at) = name.find('_') else {
            return true;
        };
        let mut parts: Vec<&str> = name[at..].split('_').collect();
        if parts.last() == Some(&"test") {
            parts.pop();
        }
        let n = parts.len();
        if n >= 2 && KNOWN_OS.contains(&parts[n - 2]) && KNOWN_ARCH.contains(&parts[n - 1]) {
            return parts[n - 2] == self.goos() && parts[n - 1] == self.goarch();
        }
        match parts.last() {
            Some(last) if KNOWN_OS.contains(last) => *last == self.goos(),
            Some(last) if KNOWN_ARCH.contains(last) => *last == self.goarch(),
            _ => true,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LinuxAmd64 => "linux/amd64",
            Self::WindowsAmd64 => "windows/amd64",
            Self::DarwinAmd64 => "darwin/amd64",
            Self::JsWasm => "js/wasm",
        }
    }
}

impl Display for BuildContext {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

impl FromStr for BuildContext {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match Self::ALL.iter().find(|ctx| ctx.as_str() == s.trim()) {
            Some(ctx) => Ok(*ctx),
            None => exn::bail!(ErrorKind::ParseError { field: "build_context", value: s.to_string() }),
        }
    }
}

impl TryFrom<String> for BuildContext {
    type Error = Error;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.as_str().parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn order_is_fixed() {
        let mut shuffled =
            vec![BuildContext::JsWasm, BuildContext::LinuxAmd64, BuildContext::DarwinAmd64, BuildContext::WindowsAmd64];
        shuffled.sort();
        assert_eq!(shuffled, BuildContext::ALL.to_vec());
    }

    #[rstest]
    #[case("foo.go", [true, true, true, true])]
    #[case("windows.go", [true, true, true, true])]
    #[case("foo_windows.go", [false, true, false, false])]
    #[case("foo_darwin_test.go", [false, false, true, false])]
    #[case("foo_linux_amd64.go", [true, false, false, false])]
    #[case("foo_linux_arm64.go", [false, false, false, false])]
    #[case("foo_wasm.go", [false, false, false, true])]
    #[case("foo_amd64.go", [true, true, true, false])]
    #[case("foo_bar.go", [true, true, true, true])]
    fn file_names(#[case] name: &str, #[case] expected: [bool; 4]) {
        let actual = BuildContext::ALL.map(|ctx| ctx.matches_file_name(name));
        assert_eq!(actual, expected);
    }

    #[rstest]
    #[case("linux", [true, false, false, false])]
    #[case("unix", [true, false, true, false])]
    #[case("cgo", [true, true, true, false])]
    #[case("amd64", [true, true, true, false])]
    #[case("gc", [true, true, true, true])]
    #[case("go1.18", [true, true, true, true])]
    #[case("go1.99", [false, false, false, false])]
    #[case("ignore", [false, false, false, false])]
    fn tags(#[case] tag: &str, #[case] expected: [bool; 4]) {
        assert_eq!(BuildContext::ALL.map(|ctx| ctx.matches_tag(tag)), expected);
    }

    #[test]
    fn display_and_parse() {
        for ctx in BuildContext::ALL {
            assert_eq!(ctx.to_string().parse::<BuildContext>().unwrap(), ctx);
        }
        assert!("plan9/386".parse::<BuildContext>().is_err());
    }
}
