use serde_json::Value;

pub fn print_summary(data: &Value) {
    println!("\n=== Stratus Cluster ===\n");
    if let Some(ts) = data["generated_at_ms"].as_u64() {
        println!("  Snapshot:  {}", ago(ts));
    }
    println!("  Agents:    {}", format_counts(&data["agents"]));
    println!("  Sessions:  {}", format_counts(&data["sessions"]));

    println!("\n[Cluster Usage]");
    let rows = data["usage"].as_array().cloned().unwrap_or_default();
    if rows.is_empty() {
        println!("  (no live agents)");
    } else {
        print_usage_table(&rows);
    }

    println!("\n[Scaling Groups]");
    let groups = data["scaling_groups"].as_array().cloned().unwrap_or_default();
    if groups.is_empty() {
        println!("  (none)");
    } else {
        println!(
            "  {:<16} {:>6} {:>12}  {}",
            "Name", "Agents", "Schedulable", "Usage"
        );
        for g in &groups {
            let usage = g["usage"].as_array().cloned().unwrap_or_default();
            println!(
                "  {:<16} {:>6} {:>12}  {}",
                g["name"].as_str().unwrap_or(""),
                g["agents"].as_u64().unwrap_or(0),
                g["schedulable_agents"].as_u64().unwrap_or(0),
                usage_cell(&usage)
            );
        }
    }
    println!();
}

pub fn print_group_usage(data: &Value) {
    println!(
        "\n=== Scaling Group '{}' ===\n",
        data["name"].as_str().unwrap_or("")
    );
    println!(
        "  Agents: {} ({} schedulable)",
        data["agents"].as_u64().unwrap_or(0),
        data["schedulable_agents"].as_u64().unwrap_or(0)
    );

    println!("\n[Usage]");
    let rows = data["usage"].as_array().cloned().unwrap_or_default();
    if rows.is_empty() {
        println!("  (no live agents)");
    } else {
        print_usage_table(&rows);
    }
    println!();
}

pub fn print_agents(agents: &[Value]) {
    println!("\n=== Stratus Agents ===\n");
    if agents.is_empty() {
        println!("No agents registered.");
        return;
    }
    println!(
        "{:<20} {:<10} {:<14} {:<22} {:<6} {}",
        "ID", "Status", "Group", "Address", "Sched", "Usage"
    );
    println!("{:-<110}", "");
    for a in agents {
        let usage = a["usage"].as_array().cloned().unwrap_or_default();
        let sched = if a["schedulable"].as_bool().unwrap_or(false) {
            "yes"
        } else {
            "no"
        };
        println!(
            "{:<20} {:<10} {:<14} {:<22} {:<6} {}",
            a["id"].as_str().unwrap_or(""),
            a["status"].as_str().unwrap_or("unknown"),
            a["scaling_group"].as_str().unwrap_or(""),
            a["addr"].as_str().unwrap_or(""),
            sched,
            usage_cell(&usage)
        );
    }
    println!();
}

pub fn print_agent_detail(agent: &Value) {
    println!("\n=== Agent Detail ===\n");
    println!("  ID:            {}", agent["id"].as_str().unwrap_or(""));
    println!(
        "  Status:        {}",
        agent["status"].as_str().unwrap_or("unknown")
    );
    println!("  Address:       {}", agent["addr"].as_str().unwrap_or(""));
    println!("  Region:        {}", agent["region"].as_str().unwrap_or(""));
    println!(
        "  Group:         {}",
        agent["scaling_group"].as_str().unwrap_or("")
    );
    println!(
        "  Schedulable:   {}",
        agent["schedulable"].as_bool().unwrap_or(false)
    );
    println!(
        "  Architecture:  {}",
        agent["architecture"].as_str().unwrap_or("")
    );
    if let Some(version) = agent["version"].as_str() {
        println!("  Version:       {}", version);
    }
    println!(
        "  First contact: {}",
        agent["first_contact"].as_str().unwrap_or("")
    );
    if let Some(lost_at) = agent["lost_at"].as_str() {
        println!("  Lost at:       {}", lost_at);
    }
    println!(
        "  CPU util:      {:.1}%",
        agent["cpu_cur_pct"].as_f64().unwrap_or(0.0)
    );
    println!(
        "  Mem used:      {}",
        agent["mem_cur"].as_str().unwrap_or("")
    );

    if let Some(rows) = agent["usage"].as_array() {
        if !rows.is_empty() {
            println!("\n[Slot Usage]");
            print_usage_table(rows);
        }
    }
    println!();
}

pub fn print_sessions(sessions: &[Value]) {
    println!("\n=== Stratus Sessions ===\n");
    if sessions.is_empty() {
        println!("No sessions found.");
        return;
    }
    println!(
        "{:<38} {:<18} {:<12} {:<20} {:>8}  {}",
        "ID", "Name", "Status", "Owner", "Elapsed", "Allocation"
    );
    println!("{:-<120}", "");
    for s in sessions {
        let allocation = s["allocation"].as_array().cloned().unwrap_or_default();
        println!(
            "{:<38} {:<18} {:<12} {:<20} {:>8}  {}",
            s["id"].as_str().unwrap_or(""),
            s["name"].as_str().unwrap_or(""),
            s["status"].as_str().unwrap_or("unknown"),
            s["access_key"].as_str().unwrap_or(""),
            s["elapsed"].as_str().unwrap_or(""),
            slot_cell(&allocation, "amount_text")
        );
    }
    println!();
}

pub fn print_session_detail(session: &Value) {
    println!("\n=== Session Detail ===\n");
    println!("  ID:         {}", session["id"].as_str().unwrap_or(""));
    println!("  Name:       {}", session["name"].as_str().unwrap_or(""));
    println!(
        "  Status:     {}",
        session["status"].as_str().unwrap_or("unknown")
    );
    if let Some(info) = session["status_info"].as_str() {
        println!("  Info:       {}", info);
    }
    println!(
        "  Type:       {}",
        session["session_type"].as_str().unwrap_or("")
    );
    println!(
        "  Cluster:    {} x{}",
        session["cluster_mode"].as_str().unwrap_or(""),
        session["cluster_size"].as_u64().unwrap_or(1)
    );
    println!("  Image:      {}", session["image"].as_str().unwrap_or(""));
    println!(
        "  Owner:      {}",
        session["access_key"].as_str().unwrap_or("")
    );
    println!(
        "  Agent:      {}",
        session["agent"].as_str().unwrap_or("N/A")
    );
    println!(
        "  Created:    {}",
        session["created_at"].as_str().unwrap_or("")
    );
    if let Some(terminated) = session["terminated_at"].as_str() {
        println!("  Terminated: {}", terminated);
    }
    println!(
        "  Elapsed:    {}",
        session["elapsed"].as_str().unwrap_or("")
    );

    if let Some(rows) = session["allocation"].as_array() {
        if !rows.is_empty() {
            println!("\n[Allocation]");
            for row in rows {
                let mut amount = row["amount_text"].as_str().unwrap_or("").to_string();
                let suffix = unit_suffix(row);
                if !suffix.is_empty() {
                    amount.push(' ');
                    amount.push_str(suffix);
                }
                println!("  {:<16} {}", row["label"].as_str().unwrap_or(""), amount);
            }
        }
    }
    println!();
}

pub fn print_keypairs(keypairs: &[Value]) {
    println!("\n=== Stratus Keypairs ===\n");
    if keypairs.is_empty() {
        println!("No keypairs found.");
        return;
    }
    println!(
        "{:<22} {:<28} {:<7} {:<6} {:<14} {:>5} {:>8}",
        "Access Key", "User", "Active", "Admin", "Policy", "Conc", "Rate"
    );
    println!("{:-<95}", "");
    for kp in keypairs {
        let active = if kp["is_active"].as_bool().unwrap_or(false) {
            "yes"
        } else {
            "no"
        };
        let admin = if kp["is_admin"].as_bool().unwrap_or(false) {
            "yes"
        } else {
            "no"
        };
        println!(
            "{:<22} {:<28} {:<7} {:<6} {:<14} {:>5} {:>8}",
            kp["access_key"].as_str().unwrap_or(""),
            kp["user_id"].as_str().unwrap_or(""),
            active,
            admin,
            kp["resource_policy"].as_str().unwrap_or(""),
            kp["concurrency_used"].as_u64().unwrap_or(0),
            kp["rate_limit"].as_u64().unwrap_or(0)
        );
    }
    println!();
}

pub fn print_usage_report(report: &Value) {
    println!("\n=== Keypair Usage ===\n");
    println!(
        "  Access Key:  {}",
        report["access_key"].as_str().unwrap_or("")
    );
    println!("  Policy:      {}", report["policy"].as_str().unwrap_or(""));
    let conc = &report["concurrency"];
    println!(
        "  Concurrency: {} of {} ({} left)",
        conc["used"].as_u64().unwrap_or(0),
        conc["limit_text"].as_str().unwrap_or(""),
        conc["remaining_text"].as_str().unwrap_or("")
    );

    if let Some(rows) = report["slots"].as_array() {
        if !rows.is_empty() {
            println!("\n[Slots]");
            println!(
                "  {:<16} {:>12} {:>12} {:>12}",
                "Resource", "Limit", "Occupied", "Remaining"
            );
            for row in rows {
                println!(
                    "  {:<16} {:>12} {:>12} {:>12}",
                    row_label(row),
                    row["limit_text"].as_str().unwrap_or(""),
                    row["occupied_text"].as_str().unwrap_or(""),
                    row["remaining_text"].as_str().unwrap_or("")
                );
            }
        }
    }
    println!();
}

pub fn print_policies(policies: &[Value]) {
    println!("\n=== Stratus Policies ===\n");
    if policies.is_empty() {
        println!("No policies found.");
        return;
    }
    println!(
        "{:<18} {:<11} {:>9} {:>10} {:>7}  {}",
        "Name", "Default", "Sessions", "Lifetime", "Idle", "Slot Caps"
    );
    println!("{:-<100}", "");
    for p in policies {
        let caps = p["slot_caps"].as_array().cloned().unwrap_or_default();
        println!(
            "{:<18} {:<11} {:>9} {:>10} {:>7}  {}",
            p["name"].as_str().unwrap_or(""),
            p["default_for_unspecified"].as_str().unwrap_or(""),
            p["max_concurrent_sessions_text"].as_str().unwrap_or(""),
            p["max_session_lifetime_text"].as_str().unwrap_or(""),
            p["idle_timeout_text"].as_str().unwrap_or(""),
            slot_cell(&caps, "cap_text")
        );
    }
    println!();
}

pub fn print_policy_detail(policy: &Value) {
    println!("\n=== Policy Detail ===\n");
    println!("  Name:              {}", policy["name"].as_str().unwrap_or(""));
    println!(
        "  Unspecified slots: {}",
        policy["default_for_unspecified"].as_str().unwrap_or("")
    );
    println!(
        "  Max sessions:      {}",
        policy["max_concurrent_sessions_text"].as_str().unwrap_or("")
    );
    println!(
        "  Containers/sess:   {}",
        policy["max_containers_per_session"].as_u64().unwrap_or(1)
    );
    println!(
        "  Session lifetime:  {}",
        policy["max_session_lifetime_text"].as_str().unwrap_or("")
    );
    println!(
        "  Idle timeout:      {}",
        policy["idle_timeout_text"].as_str().unwrap_or("")
    );
    println!(
        "  VFolder count:     {}",
        policy["max_vfolder_count_text"].as_str().unwrap_or("")
    );
    println!(
        "  VFolder size:      {}",
        policy["max_vfolder_size_text"].as_str().unwrap_or("")
    );
    if let Some(hosts) = policy["allowed_vfolder_hosts"].as_array() {
        let joined: Vec<&str> = hosts.iter().filter_map(|h| h.as_str()).collect();
        println!("  VFolder hosts:     {}", joined.join(", "));
    }
    println!(
        "  Revision:          {}",
        policy["revision"].as_u64().unwrap_or(0)
    );

    if let Some(caps) = policy["slot_caps"].as_array() {
        if !caps.is_empty() {
            println!("\n[Slot Caps]");
            println!("  {:<16} {:>12}", "Resource", "Cap");
            for row in caps {
                println!(
                    "  {:<16} {:>12}",
                    row_label(row),
                    row["cap_text"].as_str().unwrap_or("")
                );
            }
        }
    }
    println!();
}

fn print_usage_table(rows: &[Value]) {
    println!(
        "  {:<16} {:>12} {:>12} {:>8}",
        "Resource", "Used", "Capacity", "Usage%"
    );
    for row in rows {
        println!(
            "  {:<16} {:>12} {:>12} {:>8}",
            row_label(row),
            row["used_text"].as_str().unwrap_or(""),
            row["capacity_text"].as_str().unwrap_or(""),
            row["usage"]["percent_text"].as_str().unwrap_or("-")
        );
    }
}

/// Row label with the byte-unit marker folded in, e.g. "RAM (GiB)".
fn row_label(row: &Value) -> String {
    let label = row["label"].as_str().unwrap_or("");
    let suffix = unit_suffix(row);
    if suffix.is_empty() {
        label.to_string()
    } else {
        format!("{} ({})", label, suffix)
    }
}

/// "CPU 4/16, RAM 1.0/8.0 GiB" from a list of usage rows.
fn usage_cell(rows: &[Value]) -> String {
    let mut parts = Vec::new();
    for row in rows {
        let mut part = format!(
            "{} {}/{}",
            row["label"].as_str().unwrap_or(""),
            row["used_text"].as_str().unwrap_or(""),
            row["capacity_text"].as_str().unwrap_or("")
        );
        let suffix = unit_suffix(row);
        if !suffix.is_empty() {
            part.push(' ');
            part.push_str(suffix);
        }
        parts.push(part);
    }
    parts.join(", ")
}

/// "CPU 2, RAM 4.0 GiB" from rows carrying the named amount field.
fn slot_cell(rows: &[Value], amount_field: &str) -> String {
    let mut parts = Vec::new();
    for row in rows {
        let mut part = format!(
            "{} {}",
            row["label"].as_str().unwrap_or(""),
            row[amount_field].as_str().unwrap_or("")
        );
        let suffix = unit_suffix(row);
        if !suffix.is_empty() {
            part.push(' ');
            part.push_str(suffix);
        }
        parts.push(part);
    }
    parts.join(", ")
}

/// Byte-sized rows display in GiB; count rows carry no suffix. The unit
/// sits at the top level on allocation and quota rows and under `usage`
/// on utilization rows.
fn unit_suffix(row: &Value) -> &'static str {
    let unit = row["unit"]
        .as_str()
        .or_else(|| row["usage"]["unit"].as_str());
    if unit == Some("bytes") {
        "GiB"
    } else {
        ""
    }
}

fn format_counts(counts: &Value) -> String {
    let total = counts["total"].as_u64().unwrap_or(0);
    let mut parts = Vec::new();
    if let Some(by_status) = counts["by_status"].as_object() {
        for (status, n) in by_status {
            parts.push(format!("{} {}", status, n.as_u64().unwrap_or(0)));
        }
    }
    if parts.is_empty() {
        format!("{} total", total)
    } else {
        format!("{} total ({})", total, parts.join(", "))
    }
}

fn ago(ts_ms: u64) -> String {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64;
    let secs = now.saturating_sub(ts_ms) / 1_000;
    if secs < 60 {
        format!("{}s ago", secs)
    } else if secs < 3_600 {
        format!("{}m ago", secs / 60)
    } else {
        format!("{}h ago", secs / 3_600)
    }
}
