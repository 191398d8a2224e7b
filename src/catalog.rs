//! The cross toolchain: binutils, a bootstrap gcc, newlib, the runtime
//! libraries, the full gcc, and a hello-world smoke test.
//!
//! Inputs are resolved against the search path here, so a missing archive or
//! patch fails before anything runs.

use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::config::Config;
use crate::module::{Autotools, Recipe, SmokeTest, ToolDriven};
use crate::plan::ModuleSpec;
use crate::process::Invocation;
use crate::source::{DirectorySource, InputSearchPath};

const BINUTILS_ARCHIVE: &str = "binutils-2.20.tar.bz2";
const BINUTILS_PATCH: &str = "binutils-2.20.patch";
const GCC_ARCHIVES: &[&str] = &["gcc-core-4.2.2.tar.bz2", "gcc-g++-4.2.2.tar.bz2"];
const GCC_PATCH: &str = "gcc-4.2.2.patch";
const NEWLIB_ARCHIVE: &str = "newlib-1.17.0.tar.gz";
const NEWLIB_PATCH: &str = "newlib-1.17.0.patch";

const ALIGN_CFLAGS: &str = "-DNACL_ALIGN_BYTES=32 -DNACL_ALIGN_POW2=5";

const HELLO_WORLD: &str = r#"
#include <stdio.h>
int main() {
  printf("Hello world\n");
  return 0;
}
"#;

/// Everything the catalog needs besides the archives themselves.
#[derive(Debug, Clone)]
pub struct ToolchainInputs {
    pub search: InputSearchPath,
    /// `native_client/` checkout: runtime headers, scons.
    pub nacl_dir: PathBuf,
    pub target: String,
    pub jobs: usize,
}

impl ToolchainInputs {
    pub fn from_config(config: &Config) -> Self {
        Self {
            search: config.search_path(),
            nacl_dir: config.nacl_dir(),
            target: config.target.clone(),
            jobs: config.jobs,
        }
    }
}

/// Module declarations in build order.
pub fn toolchain_modules(inputs: &ToolchainInputs) -> Result<Vec<ModuleSpec>> {
    let binutils_source = DirectorySource::archive(inputs.search.find(BINUTILS_ARCHIVE)?)
        .patched(inputs.search.find(BINUTILS_PATCH)?);
    let gcc_source = DirectorySource::layered(inputs.search.find_all(GCC_ARCHIVES)?)
        .patched(inputs.search.find(GCC_PATCH)?);
    let newlib_source = DirectorySource::archive(inputs.search.find(NEWLIB_ARCHIVE)?)
        .patched(inputs.search.find(NEWLIB_PATCH)?);

    Ok(vec![
        ModuleSpec::new("binutils", binutils_source, binutils(inputs)),
        ModuleSpec::new("pregcc", gcc_source.clone(), pregcc(inputs)),
        ModuleSpec::new("newlib", newlib_source, newlib(inputs)),
        ModuleSpec::new(
            "nc_threads",
            DirectorySource::Empty,
            scons(&inputs.nacl_dir, "install_libpthread", &[]),
        ),
        ModuleSpec::new("fullgcc", gcc_source, fullgcc(inputs)),
        ModuleSpec::new(
            "libnacl_headers",
            DirectorySource::Empty,
            scons(&inputs.nacl_dir, "extra_sdk_update_header", &["nocpp=yes"]),
        ),
        ModuleSpec::new(
            "libnacl",
            DirectorySource::Empty,
            scons(&inputs.nacl_dir, "extra_sdk_update", &[]),
        ),
        ModuleSpec::new("test", DirectorySource::Empty, smoke_test(&inputs.target)),
    ])
}

fn binutils(inputs: &ToolchainInputs) -> Recipe {
    Recipe::Autotools(
        Autotools::new()
            .configure_env("CFLAGS", ALIGN_CFLAGS)
            .option("target", &inputs.target)
            .make_args([format!("-j{}", inputs.jobs)]),
    )
}

// Options both gcc stages share.
fn gcc_common(inputs: &ToolchainInputs, cflags: &str) -> Autotools {
    Autotools::new()
        .configure_env("CC", "gcc")
        .configure_env("CFLAGS", cflags)
        .tool_option("with-as", format!("{}-as", inputs.target))
        .flag("disable-libmudflap")
        .flag("disable-decimal-float")
        .flag("disable-libssp")
        .flag("disable-libstdcxx-pch")
        .flag("disable-shared")
        .option("target", &inputs.target)
}

fn pregcc(inputs: &ToolchainInputs) -> Recipe {
    let cflags = format!("-Dinhibit_libc -D__gthr_posix_h {}", ALIGN_CFLAGS);
    Recipe::Autotools(
        gcc_common(inputs, &cflags)
            .flag("without-headers")
            .option("enable-languages", "c")
            .flag("disable-threads")
            // The default target fails configuring libiberty without a libc.
            .make_args(["all-gcc".to_string(), format!("-j{}", inputs.jobs)])
            .install_target("install-gcc"),
    )
}

fn fullgcc(inputs: &ToolchainInputs) -> Recipe {
    let cflags = format!("-Dinhibit_libc {}", ALIGN_CFLAGS);
    Recipe::Autotools(
        gcc_common(inputs, &cflags)
            .flag("with-newlib")
            .option("enable-threads", "nacl")
            .flag("enable-tls")
            .flag("disable-libgomp")
            .option("enable-languages", "c,c++")
            .make_args(["all".to_string(), format!("-j{}", inputs.jobs)]),
    )
}

fn newlib(inputs: &ToolchainInputs) -> Recipe {
    let runtime = inputs.nacl_dir.join("src/trusted/service_runtime");
    let export_headers = Invocation::new(runtime.join("export_header.py"))
        .arg(runtime.join("include"))
        .arg("newlib/libc/sys/nacl");

    Recipe::Autotools(
        Autotools::new()
            .pre_configure(export_headers)
            .configure_env("CFLAGS", "-m32 -march=i486 -msse2 -mfpmath=sse")
            .flag("enable-newlib-io-long-long")
            .flag("enable-newlib-io-c99-formats")
            .option("target", &inputs.target),
    )
}

fn scons(nacl_dir: &Path, target: &str, extra: &[&str]) -> Recipe {
    let mut args = vec!["MODE=nacl_extra_sdk".to_string(), target.to_string()];
    args.extend(extra.iter().map(|a| a.to_string()));
    args.extend(["naclsdk_validate=0".to_string(), "--verbose".to_string()]);

    Recipe::ToolDriven(ToolDriven {
        tool_dir: nacl_dir.to_path_buf(),
        program: "./scons".to_string(),
        args,
        destination_arg: "naclsdk_mode=custom:".to_string(),
    })
}

fn smoke_test(target: &str) -> Recipe {
    Recipe::SmokeTest(SmokeTest {
        file_name: "hellow.c".to_string(),
        contents: HELLO_WORLD.to_string(),
        compile: vec![
            format!("{}-gcc", target),
            "hellow.c".to_string(),
            "-o".to_string(),
            "hellow".to_string(),
        ],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{build_error, ErrorKind};
    use std::fs;
    use tempfile::TempDir;

    fn inputs_with_archives(root: &Path) -> ToolchainInputs {
        let archives = root.join("third_party");
        let patches = root.join("native_client/tools/patches");
        fs::create_dir_all(&archives).unwrap();
        fs::create_dir_all(&patches).unwrap();
        for name in [BINUTILS_ARCHIVE, NEWLIB_ARCHIVE]
            .iter()
            .chain(GCC_ARCHIVES.iter())
        {
            fs::write(archives.join(name), "").unwrap();
        }
        for name in [BINUTILS_PATCH, GCC_PATCH, NEWLIB_PATCH] {
            fs::write(patches.join(name), "").unwrap();
        }

        ToolchainInputs {
            search: InputSearchPath::new([archives, patches]),
            nacl_dir: root.join("native_client"),
            target: "nacl".to_string(),
            jobs: 4,
        }
    }

    #[test]
    fn test_module_order() {
        let temp = TempDir::new().unwrap();
        let modules = toolchain_modules(&inputs_with_archives(temp.path())).unwrap();

        let names: Vec<_> = modules.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "binutils",
                "pregcc",
                "newlib",
                "nc_threads",
                "fullgcc",
                "libnacl_headers",
                "libnacl",
                "test"
            ]
        );
    }

    #[test]
    fn test_gcc_source_layers_core_then_cxx() {
        let temp = TempDir::new().unwrap();
        let inputs = inputs_with_archives(temp.path());
        let modules = toolchain_modules(&inputs).unwrap();

        let DirectorySource::Patched { inner, patch } = &modules[1].source else {
            panic!("pregcc source should be patched");
        };
        assert_eq!(
            patch,
            &temp.path().join("native_client/tools/patches").join(GCC_PATCH)
        );
        assert_eq!(
            **inner,
            DirectorySource::layered(vec![
                temp.path().join("third_party/gcc-core-4.2.2.tar.bz2"),
                temp.path().join("third_party/gcc-g++-4.2.2.tar.bz2"),
            ])
        );
        assert_eq!(modules[1].source, modules[4].source);
    }

    #[test]
    fn test_gcc_configure_options() {
        let temp = TempDir::new().unwrap();
        let modules = toolchain_modules(&inputs_with_archives(temp.path())).unwrap();

        let Recipe::Autotools(pregcc) = &modules[1].recipe else {
            panic!("pregcc should be autotools");
        };
        let args = pregcc.option_args();
        assert!(args.contains(&"--without-headers".to_string()));
        assert!(args.contains(&"--enable-languages=c".to_string()));
        assert!(args.contains(&"--target=nacl".to_string()));
        assert_eq!(pregcc.tool_options.get("with-as").map(String::as_str), Some("nacl-as"));
        assert_eq!(pregcc.make_args, vec!["all-gcc", "-j4"]);
        assert_eq!(pregcc.install_target, "install-gcc");

        let Recipe::Autotools(fullgcc) = &modules[4].recipe else {
            panic!("fullgcc should be autotools");
        };
        assert!(fullgcc
            .option_args()
            .contains(&"--enable-languages=c,c++".to_string()));
        assert_eq!(
            fullgcc.configure_env.get("CFLAGS"),
            Some("-Dinhibit_libc -DNACL_ALIGN_BYTES=32 -DNACL_ALIGN_POW2=5")
        );
    }

    #[test]
    fn test_scons_modules() {
        let temp = TempDir::new().unwrap();
        let modules = toolchain_modules(&inputs_with_archives(temp.path())).unwrap();

        let Recipe::ToolDriven(headers) = &modules[5].recipe else {
            panic!("libnacl_headers should be tool-driven");
        };
        assert_eq!(headers.tool_dir, temp.path().join("native_client"));
        assert_eq!(
            headers.args,
            vec![
                "MODE=nacl_extra_sdk",
                "extra_sdk_update_header",
                "nocpp=yes",
                "naclsdk_validate=0",
                "--verbose"
            ]
        );
    }

    #[test]
    fn test_missing_patch_fails_up_front() {
        let temp = TempDir::new().unwrap();
        let inputs = inputs_with_archives(temp.path());
        fs::remove_file(
            temp.path()
                .join("native_client/tools/patches")
                .join(NEWLIB_PATCH),
        )
        .unwrap();

        let err = toolchain_modules(&inputs).unwrap_err();

        assert_eq!(
            build_error(&err).map(|e| e.kind()),
            Some(ErrorKind::InputNotFound)
        );
        assert!(err.to_string().contains(NEWLIB_PATCH));
    }
}
