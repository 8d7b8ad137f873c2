//src/tools.rs

use std::env;
use std::fs::{self, File};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::error::MergeError;

/// Reference databases for the external aligners.
#[derive(Debug, Clone)]
pub struct Databases {
    /// CARD nucleotide FASTA (minimap2 target).
    pub card: PathBuf,
    /// PLSDB plasmid FASTA (minimap2 target).
    pub plsdb: PathBuf,
    /// mobileOG protein FASTA, indexed with `lastdb` on first use.
    pub mge: PathBuf,
    /// Centrifuge index prefix; `None` skips classification.
    pub centrifuge: Option<PathBuf>,
}

/// Raw tool outputs of one sample, ready to be merged.
#[derive(Debug, Clone)]
pub struct ToolOutputs {
    pub arg_paf: PathBuf,
    pub plasmid_paf: PathBuf,
    pub mge_psl: PathBuf,
    pub centrifuge_result: Option<PathBuf>,
}

/// Looks `tool` up in the directories of `PATH`.
pub fn find_on_path(tool: &str) -> Option<PathBuf> {
    let paths = env::var_os("PATH")?;
    env::split_paths(&paths)
        .map(|dir| dir.join(tool))
        .find(|candidate| candidate.is_file())
}

/// Fails with the first tool that is not installed.
pub fn ensure_tools(tools: &[&str]) -> Result<(), MergeError> {
    for tool in tools {
        if find_on_path(tool).is_none() {
            return Err(MergeError::ToolNotFound {
                tool: tool.to_string(),
            });
        }
    }
    Ok(())
}

fn program_name(cmd: &Command) -> String {
    cmd.get_program().to_string_lossy().into_owned()
}

/// Runs `cmd` to completion, optionally sending stdout to `stdout_to`.
/// A non-zero exit status becomes `ToolFailed` carrying the tool's stderr.
pub fn run_tool(mut cmd: Command, stdout_to: Option<&Path>) -> Result<(), MergeError> {
    let tool = program_name(&cmd);
    if let Some(path) = stdout_to {
        let file = File::create(path).map_err(|e| MergeError::io(path, e))?;
        cmd.stdout(Stdio::from(file));
    } else {
        cmd.stdout(Stdio::null());
    }
    cmd.stderr(Stdio::piped());

    log::debug!("Running {:?}", cmd);
    let output = match cmd.output() {
        Ok(output) => output,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(MergeError::ToolNotFound { tool });
        }
        Err(e) => return Err(MergeError::io(PathBuf::from(&tool), e)),
    };

    if !output.status.success() {
        return Err(MergeError::ToolFailed {
            tool,
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(())
}

pub fn is_fastq(path: &Path) -> bool {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    let name = name.strip_suffix(".gz").unwrap_or(&name);
    name.ends_with(".fastq") || name.ends_with(".fq")
}

pub fn seqtk_to_fasta_command(reads: &Path) -> Command {
    let mut cmd = Command::new("seqtk");
    cmd.args(["seq", "-A"]).arg(reads);
    cmd
}

pub fn minimap2_command(db: &Path, reads: &Path, threads: usize) -> Command {
    let mut cmd = Command::new("minimap2");
    cmd.args(["-x", "map-ont", "--secondary=no", "-t"])
        .arg(threads.to_string())
        .arg(db)
        .arg(reads);
    cmd
}

pub fn lastdb_command(prefix: &Path, proteins: &Path, threads: usize) -> Command {
    let mut cmd = Command::new("lastdb");
    cmd.arg(format!("-P{threads}"))
        .args(["-q", "-c"])
        .arg(prefix)
        .arg(proteins);
    cmd
}

pub fn last_train_command(prefix: &Path, reads: &Path, threads: usize) -> Command {
    let mut cmd = Command::new("last-train");
    cmd.arg(format!("-P{threads}"))
        .arg("--codon")
        .arg(prefix)
        .arg(reads);
    cmd
}

pub fn lastal_command(prefix: &Path, train: &Path, reads: &Path, threads: usize) -> Command {
    let mut cmd = Command::new("lastal");
    cmd.arg(format!("-P{threads}"))
        .arg("-p")
        .arg(train)
        .args(["-m100", "-D1e9", "-K1"])
        .arg(prefix)
        .arg(reads);
    cmd
}

pub fn maf_convert_command(maf: &Path) -> Command {
    let mut cmd = Command::new("maf-convert");
    cmd.arg("psl").arg(maf);
    cmd
}

pub fn centrifuge_command(index: &Path, reads: &Path, report: &Path, result: &Path, threads: usize) -> Command {
    let mut cmd = Command::new("centrifuge");
    cmd.arg("-f")
        .arg("-x")
        .arg(index)
        .arg("-U")
        .arg(reads)
        .arg("--report-file")
        .arg(report)
        .arg("-S")
        .arg(result)
        .arg("-p")
        .arg(threads.to_string());
    cmd
}

/// Runs the aligners and the classifier for one sample inside `workdir`.
/// Each step must exit 0; the first failure aborts the run.
pub fn run_annotation_tools(
    reads: &Path,
    sample: &str,
    dbs: &Databases,
    workdir: &Path,
    threads: usize,
) -> Result<ToolOutputs, MergeError> {
    fs::create_dir_all(workdir).map_err(|e| MergeError::io(workdir, e))?;

    let mut required = vec!["minimap2", "lastdb", "last-train", "lastal", "maf-convert"];
    if is_fastq(reads) {
        required.push("seqtk");
    }
    if dbs.centrifuge.is_some() {
        required.push("centrifuge");
    }
    ensure_tools(&required)?;

    let fasta = if is_fastq(reads) {
        let fasta = workdir.join(format!("{sample}.fa"));
        log::info!("Converting {} to FASTA", reads.display());
        run_tool(seqtk_to_fasta_command(reads), Some(&fasta))?;
        fasta
    } else {
        reads.to_path_buf()
    };

    let centrifuge_result = match &dbs.centrifuge {
        Some(index) => {
            log::info!("Running centrifuge...");
            let report = workdir.join(format!("{sample}_centrifuge_report.tsv"));
            let result = workdir.join(format!("{sample}_centrifuge_result.tsv"));
            run_tool(centrifuge_command(index, &fasta, &report, &result, threads), None)?;
            Some(result)
        }
        None => None,
    };

    log::info!("Identifying ARGs...");
    let arg_paf = workdir.join(format!("{sample}_ARG.paf"));
    run_tool(minimap2_command(&dbs.card, &fasta, threads), Some(&arg_paf))?;

    log::info!("Identifying plasmids...");
    let plasmid_paf = workdir.join(format!("{sample}_plsdb.paf"));
    run_tool(minimap2_command(&dbs.plsdb, &fasta, threads), Some(&plasmid_paf))?;

    log::info!("Identifying MGEs...");
    let prefix = workdir.join("mge_trandb");
    if !prefix.with_extension("prj").exists() {
        run_tool(lastdb_command(&prefix, &dbs.mge, threads), None)?;
    }
    let train = workdir.join(format!("{sample}.train"));
    run_tool(last_train_command(&prefix, &fasta, threads), Some(&train))?;
    let maf = workdir.join(format!("{sample}.maf"));
    run_tool(lastal_command(&prefix, &train, &fasta, threads), Some(&maf))?;
    let mge_psl = workdir.join(format!("{sample}_MGE.psl"));
    run_tool(maf_convert_command(&maf), Some(&mge_psl))?;

    Ok(ToolOutputs {
        arg_paf,
        plasmid_paf,
        mge_psl,
        centrifuge_result,
    })
}
