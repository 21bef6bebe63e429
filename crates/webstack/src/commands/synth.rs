use crate::OutputFormat;
use crate::utils::Workspace;

/// 合成結果を標準出力に書き出す（パスワードは伏せ字）
pub fn handle(workspace: &Workspace, format: OutputFormat) -> anyhow::Result<()> {
    let (deployment, _) = workspace.assemble()?;
    let synthesis = deployment.synthesize();

    let output = match format {
        OutputFormat::Yaml => serde_yaml::to_string(&synthesis)?,
        OutputFormat::Json => serde_json::to_string_pretty(&synthesis)?,
    };
    println!("{}", output);
    Ok(())
}
