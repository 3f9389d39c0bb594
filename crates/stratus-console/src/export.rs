use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};

use crate::agents::AgentView;
use crate::sessions::SessionView;

/// RFC 4180 quoting: only fields carrying a delimiter, quote, or line
/// break get wrapped.
pub(crate) fn csv_escape(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') || field.contains('\r') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn csv_line(fields: &[String]) -> String {
    let mut line = fields
        .iter()
        .map(|f| csv_escape(f))
        .collect::<Vec<_>>()
        .join(",");
    line.push('\n');
    line
}

pub(crate) fn csv_response(filename: &str, body: String) -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        body,
    )
        .into_response()
}

fn usage_summary(view: &AgentView) -> String {
    view.usage
        .iter()
        .map(|row| {
            let suffix = row.unit_suffix();
            if suffix.is_empty() {
                format!("{} {}/{}", row.label, row.used_text, row.capacity_text)
            } else {
                format!(
                    "{} {}/{} {}",
                    row.label, row.used_text, row.capacity_text, suffix
                )
            }
        })
        .collect::<Vec<_>>()
        .join("; ")
}

fn allocation_summary(view: &SessionView) -> String {
    view.allocation
        .iter()
        .map(|entry| {
            let suffix = entry.unit.display_suffix();
            if suffix.is_empty() {
                format!("{} {}", entry.label, entry.amount_text)
            } else {
                format!("{} {} {}", entry.label, entry.amount_text, suffix)
            }
        })
        .collect::<Vec<_>>()
        .join("; ")
}

pub(crate) fn agents_csv(views: &[AgentView]) -> String {
    let mut out = String::from(
        "id,status,scaling_group,addr,region,architecture,schedulable,version,first_contact,lost_at,cpu_util_pct,mem_used,usage\n",
    );
    for view in views {
        out.push_str(&csv_line(&[
            view.id.clone(),
            view.status.as_str().to_string(),
            view.scaling_group.clone(),
            view.addr.clone(),
            view.region.clone(),
            view.architecture.clone(),
            view.schedulable.to_string(),
            view.version.clone().unwrap_or_default(),
            view.first_contact.clone(),
            view.lost_at.clone().unwrap_or_default(),
            view.cpu_cur_pct.to_string(),
            view.mem_cur.clone(),
            usage_summary(view),
        ]));
    }
    out
}

pub(crate) fn sessions_csv(views: &[SessionView]) -> String {
    let mut out = String::from(
        "id,name,access_key,status,type,cluster_mode,cluster_size,image,agent,created_at,terminated_at,elapsed,allocation\n",
    );
    for view in views {
        out.push_str(&csv_line(&[
            view.id.clone(),
            view.name.clone(),
            view.access_key.clone(),
            view.status.as_str().to_string(),
            view.session_type.as_str().to_string(),
            view.cluster_mode.as_str().to_string(),
            view.cluster_size.to_string(),
            view.image.clone(),
            view.agent.clone().unwrap_or_default(),
            view.created_at.clone(),
            view.terminated_at.clone().unwrap_or_default(),
            view.elapsed.clone(),
            allocation_summary(view),
        ]));
    }
    out
}
