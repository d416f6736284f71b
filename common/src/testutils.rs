use async_recursion::async_recursion;

/// Files of the test tree: path relative to `foo`, contents, contents after anonymization.
pub const FIXTURE: &[(&str, &str, &str)] = &[
    (
        "0.txt",
        "Lorem ipsum dolor sit amet\nsed do enim ad\n",
        "Lorem ipsum dolor sit AMET_REPLACE\nsed do ENIM_REPLACE ad\n",
    ),
    (
        "bar/1.txt",
        "Ut enim ad minim veniam\n",
        "Ut ENIM_REPLACE ad minim veniam\n",
    ),
    (
        "bar/2.txt",
        "consectetur adipiscing elit\n",
        "consectetur adipiscing elit\n",
    ),
    (
        "bar/3.txt",
        "AMET Amet amet\r\nENIM",
        "AMET_REPLACE AMET_REPLACE AMET_REPLACE\nENIM_REPLACE\n",
    ),
    ("baz/4.txt", "", ""),
    (
        "baz/5.txt",
        "Duis aute irure dolor\n\nsit amet, enim\n",
        "Duis aute irure dolor\n\nsit AMET_REPLACE, ENIM_REPLACE\n",
    ),
];

pub async fn create_temp_dir() -> anyhow::Result<std::path::PathBuf> {
    let mut idx = 0;
    loop {
        let tmp_dir = std::env::temp_dir().join(format!("ranon_test{}", &idx));
        if let Err(error) = tokio::fs::create_dir(&tmp_dir).await {
            match error.kind() {
                std::io::ErrorKind::AlreadyExists => {
                    idx += 1;
                }
                _ => return Err(error.into()),
            }
        } else {
            return Ok(tmp_dir);
        }
    }
}

pub async fn setup_test_dir() -> anyhow::Result<std::path::PathBuf> {
    // create a temporary directory
    let tmp_dir = create_temp_dir().await?;
    // foo
    // |- 0.txt
    // |- bar
    //    |- 1.txt
    //    |- 2.txt
    //    |- 3.txt
    // |- baz
    //    |- 4.txt (empty)
    //    |- 5.txt
    let foo_path = tmp_dir.join("foo");
    for (path, contents, _) in FIXTURE {
        let path = foo_path.join(path);
        tokio::fs::create_dir_all(path.parent().unwrap()).await?;
        tokio::fs::write(&path, contents).await?;
    }
    Ok(tmp_dir)
}

/// Sorted non-directory paths under `root`, relative to `root`.
pub async fn list_files(root: &std::path::Path) -> anyhow::Result<Vec<std::path::PathBuf>> {
    #[async_recursion]
    async fn visit(
        root: &std::path::Path,
        dir: &std::path::Path,
        files: &mut Vec<std::path::PathBuf>,
    ) -> anyhow::Result<()> {
        let mut entries = tokio::fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if entry.file_type().await?.is_dir() {
                visit(root, &path, files).await?;
            } else {
                files.push(path.strip_prefix(root)?.to_owned());
            }
        }
        Ok(())
    }
    let mut files = vec![];
    visit(root, root, &mut files).await?;
    files.sort();
    Ok(files)
}

pub fn is_root() -> bool {
    nix::unistd::Uid::effective().is_root()
}
