use crate::utils::{self, Workspace};
use colored::Colorize;

pub async fn handle(workspace: &Workspace, yes: bool) -> anyhow::Result<()> {
    println!("{}", "環境を構築します...".blue().bold());
    workspace.print_header();
    let (deployment, _) = workspace.assemble()?;

    let engine = workspace.connect().await?;
    let plan = engine.plan(&deployment.stack).await?;

    println!();
    utils::print_plan(&plan);

    if !plan.has_changes {
        println!("{}", "✓ 変更はありません".green());
    } else {
        // 確認（--yesが指定されていない場合）
        if !yes {
            println!();
            println!("{}", "警告: 上記のリソースを作成・変更・削除します。".yellow());
            println!("実行するには --yes オプションを指定してください");
            return Ok(());
        }

        println!();
        println!("{}", "適用中...".blue());
        let result = engine.apply(&deployment.stack, &plan).await?;
        println!();
        utils::print_apply_result(&result);

        if let Some(failure) = result.first_failure() {
            anyhow::bail!(
                "{} の適用に失敗しました: {}",
                failure.action_id,
                failure.error.as_deref().unwrap_or("unknown error")
            );
        }
        if !result.is_complete() {
            println!();
            println!(
                "{}",
                "⚠ 検証待ちのリソースがあります。完了後に再度 webstack up を実行してください"
                    .yellow()
            );
        }
    }

    let outputs = engine.resolve_outputs(&deployment).await?;
    println!();
    println!("{}", "出力:".bold());
    for (name, value) in &outputs {
        println!("  {} = {}", name.cyan(), value);
    }
    Ok(())
}
