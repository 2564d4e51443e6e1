use std::path::PathBuf;

use rmcp::{
    ServiceExt,
    model::CallToolRequestParams,
    transport::{ConfigureCommandExt, TokioChildProcess},
};
use serde_json::json;

#[tokio::test]
async fn mcp_stdio_reports_missing_index() -> Result<(), Box<dyn std::error::Error>>
{
    let tempdir = tempfile::tempdir()?;

    let bin = jobmatch_bin()?;
    let transport = TokioChildProcess::new(
        tokio::process::Command::new(bin).configure(|cmd| {
            cmd.arg("mcp")
                .env("JOBMATCH_DATA_DIR", tempdir.path())
                .env("JOBMATCH_LOG", "error");
        }),
    )?;

    let client = ().serve(transport).await?;

    let tools = client.peer().list_all_tools().await?;
    let mut names: Vec<String> =
        tools.iter().map(|t| t.name.to_string()).collect();
    names.sort();
    assert_eq!(names, vec!["jobmatch_match", "jobmatch_search"]);

    let args = json!({
        "query": "Rust engineer",
        "topJobs": 3,
        "location": "Berlin"
    });
    let result = client
        .peer()
        .call_tool(
            CallToolRequestParams::new("jobmatch_search")
                .with_arguments(args.as_object().unwrap().clone()),
        )
        .await?;

    assert_eq!(result.is_error, Some(true));
    let text = result
        .content
        .first()
        .and_then(|c| c.as_text())
        .map(|t| t.text.clone())
        .unwrap_or_default();
    assert!(text.contains("jobmatch index"), "unexpected message: {text}");

    client.cancel().await?;
    Ok(())
}

fn jobmatch_bin() -> Result<PathBuf, Box<dyn std::error::Error>> {
    if let Ok(bin) = std::env::var("CARGO_BIN_EXE_jobmatch") {
        return Ok(PathBuf::from(bin));
    }

    let mut path = std::env::current_exe()?;
    path.pop();
    if path.ends_with("deps") {
        path.pop();
    }
    path.push("jobmatch");

    if cfg!(windows) {
        path.set_extension("exe");
    }

    Ok(path)
}
