pub const ORGANIZER_INSTRUCTIONS: &str = "You are a file organizer. You are shown one directory at a time and \
decide where its contents belong.\n\n\
Always answer with a JSON array of action objects and nothing else. Each object has an \
\"action\" field set to one of:\n\
- \"create_folder\": {\"action\": \"create_folder\", \"source\": \"<folder name>\"}\n\
- \"move_file\": {\"action\": \"move_file\", \"source\": \"<file name>\", \"destination\": \"<folder>/<file name>\"}\n\
- \"rename_folder\": {\"action\": \"rename_folder\", \"source\": \"<folder name>\", \"name\": \"<new folder name>\"}\n\n\
All paths are relative to the directory being organized. Never use absolute paths or \"..\". \
Prefer reusing an existing folder over inventing a near-duplicate. Use short, human-readable \
folder names. An empty array [] means no change is needed.";

const MAX_LISTED_FOLDERS: usize = 100;

fn folder_list(folders: &[String]) -> String {
    if folders.is_empty() {
        return "(none)".to_string();
    }
    let mut out = folders
        .iter()
        .take(MAX_LISTED_FOLDERS)
        .map(|f| format!("- {f}"))
        .collect::<Vec<_>>()
        .join("\n");
    let more = folders.len().saturating_sub(MAX_LISTED_FOLDERS);
    if more > 0 {
        out.push_str(&format!("\n...and {more} more"));
    }
    out
}

/// Asks for exactly one `move_file` action for `file_name`.
pub fn build_file_prompt(file_name: &str, dir_name: &str, existing_folders: &[String]) -> String {
    format!(
        "File: {file_name}\n\
         Directory: {dir_name}\n\
         Existing folders in this directory:\n{}\n\n\
         Choose a folder for this file. Respond with exactly one move_file action whose source is \
         \"{file_name}\" and whose destination is \"<folder>/{file_name}\". Reuse an existing \
         folder when one fits.",
        folder_list(existing_folders)
    )
}

/// Asks for zero or more `rename_folder` actions over the sibling folders of `dir_name`.
pub fn build_evaluation_prompt(dir_name: &str, folders: &[String]) -> String {
    format!(
        "Directory: {dir_name}\n\
         Folders:\n{}\n\n\
         Review these sibling folder names. If two folders hold the same kind of content, or a \
         name is unclear, respond with rename_folder actions to fix it. Never rename a folder to \
         the name of an existing sibling, that sibling would be replaced. Respond with [] if the \
         names are already good.",
        folder_list(folders)
    )
}

/// Second sweep over the finished tree; same action vocabulary as evaluation.
pub fn build_refinement_prompt(dir_name: &str, folders: &[String]) -> String {
    format!(
        "Directory: {dir_name}\n\
         Folders:\n{}\n\n\
         The tree has been organized. Do a final pass over these folder names: make them \
         consistent in style and clear about what they hold, using rename_folder actions only. \
         Never reuse the name of an existing sibling. Respond with [] if nothing should change.",
        folder_list(folders)
    )
}
