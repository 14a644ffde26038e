use regex::Regex;
use std::sync::LazyLock;

macro_rules! regex {
    ($name:ident, $regex:expr) => {
        pub(crate) static $name: LazyLock<Regex> = LazyLock::new(|| Regex::new($regex).unwrap());
    };
}

/// Operating systems that Go recognises in file names and build tags.
pub(crate) const KNOWN_OS: &[&str] = &[
    "aix", "android", "darwin", "dragonfly", "freebsd", "hurd", "illumos", "ios", "js", "linux", "nacl", "netbsd",
    "openbsd", "plan9", "solaris", "wasip1", "windows", "zos",
];

/// Operating systems matched by the `unix` build tag.
pub(crate) const UNIX_OS: &[&str] = &[
    "aix", "android", "darwin", "dragonfly", "freebsd", "hurd", "illumos", "ios", "linux", "netbsd", "openbsd",
    "solaris",
];

/// Architectures that Go recognises in file names and build tags.
pub(crate) const KNOWN_ARCH: &[&str] = &[
    "386", "amd64", "amd64p32", "arm", "armbe", "arm64", "arm64be", "loong64", "mips", "mipsle", "mips64",
    "mips64le", "mips64p32", "mips64p32le", "ppc", "ppc64", "ppc64le", "riscv", "riscv64", "s390", "s390x", "sparc",
    "sparc64", "wasm",
];

/// Highest `go1.N` release tag satisfied by every build context.
pub(crate) const MAX_GO_RELEASE: u32 = 22;

/// Module whose packages are imported by their bare directory path.
pub(crate) const STD_MODULE: &str = "std";

// https://go.dev/ref/mod#pseudo-versions
regex!(
    PSEUDO_VERSION_REGEX,
    r"^v[0-9]+\.(0\.0-|\d+\.\d+-([^+]*\.)?0\.)\d{14}-[A-Za-z0-9]+(\+[0-9A-Za-z-]+(\.[0-9A-Za-z-]+)*)?$"
);
regex!(RELEASE_TAG_REGEX, r"^go1\.(\d+)$");
regex!(REPOSITORY_HOST_REGEX, r"^(github\.com|gitlab\.com|bitbucket\.org)/([^/]+)/([^/]+)");
