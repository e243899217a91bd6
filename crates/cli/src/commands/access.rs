//! Permission checks.

use matricula_console::{Console, ConsoleError};
use matricula_core::{Operation, PermissionMatrix, Resource, RoleId};

use super::{CliError, emit};

/// Check one permission for the signed-in user.
///
/// Unknown resource or operation names are rejected rather than denied, so
/// typos do not look like missing grants.
pub fn can(console: &Console, resource: &str, operation: &str) -> Result<(), CliError> {
    let resource: Resource = resource.parse().map_err(ConsoleError::Validation)?;
    let operation: Operation = operation
        .to_ascii_uppercase()
        .parse()
        .map_err(ConsoleError::Validation)?;

    if console.has_permission(resource, operation) {
        emit(format_args!("allowed: {resource}:{operation}"));
        Ok(())
    } else {
        emit(format_args!("denied: {resource}:{operation}"));
        Err(CliError::Denied)
    }
}

/// Show a role's permission matrix.
pub async fn matrix(console: &Console, role_id: i64) -> Result<(), CliError> {
    let role_id = RoleId::new(role_id);
    let roles = console.list_roles().await?;
    let role = roles
        .iter()
        .find(|role| role.id == role_id)
        .ok_or_else(|| CliError::InvalidArgument(format!("no role with ID {role_id}")))?;

    emit(format_args!("Permission matrix for {} ({})", role.name, role.id));
    for line in render(&PermissionMatrix::for_role(role)) {
        emit(line);
    }
    Ok(())
}

/// One header line plus one line per resource.
fn render(matrix: &PermissionMatrix) -> Vec<String> {
    let mut lines = vec![format!(
        "{:<12} {}",
        "",
        Operation::ALL
            .iter()
            .map(|op| format!("{:<7}", op.as_str()))
            .collect::<String>()
    )];
    for (resource, cells) in matrix.rows() {
        let cells: String = cells
            .iter()
            .map(|(_, granted)| format!("{:<7}", if *granted { "[x]" } else { "[ ]" }))
            .collect();
        lines.push(format!("{:<12} {cells}", resource.as_str()));
    }
    lines
}
