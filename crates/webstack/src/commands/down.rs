use crate::utils::{self, Workspace};
use colored::Colorize;

pub async fn handle(workspace: &Workspace, yes: bool) -> anyhow::Result<()> {
    println!("{}", "環境を削除します...".yellow());
    workspace.print_header();
    let (deployment, _) = workspace.assemble()?;

    if !yes {
        println!();
        println!(
            "{}",
            format!(
                "警告: {} の {} 個のリソースを削除します。",
                workspace.context.stack_name(),
                deployment.stack.len()
            )
            .yellow()
        );
        println!("実行するには --yes オプションを指定してください");
        return Ok(());
    }

    let engine = workspace.connect().await?;
    let result = engine.destroy(&deployment.stack).await?;
    println!();
    utils::print_apply_result(&result);

    if let Some(failure) = result.first_failure() {
        anyhow::bail!(
            "{} の削除に失敗しました: {}",
            failure.action_id,
            failure.error.as_deref().unwrap_or("unknown error")
        );
    }
    println!("{}", "✓ 削除が完了しました".green().bold());
    Ok(())
}
