//! Simple substitution-based template engine for notification bodies.
//! Mission: render `{{var}}` placeholders from a flat key/value map — no
//! control flow, no partials, matching the limited scope notifications need.

use std::collections::HashMap;

pub struct Template<'a> {
    source: &'a str,
}

impl<'a> Template<'a> {
    pub fn new(source: &'a str) -> Self {
        Self { source }
    }

    pub fn render(&self, vars: &HashMap<&str, String>) -> String {
        let mut out = String::with_capacity(self.source.len());
        let mut rest = self.source;

        while let Some(start) = rest.find("{{") {
            out.push_str(&rest[..start]);
            let after_open = &rest[start + 2..];
            match after_open.find("}}") {
                Some(end) => {
                    let key = after_open[..end].trim();
                    match vars.get(key) {
                        Some(value) => out.push_str(value),
                        None => out.push_str(&format!("{{{{{key}}}}}")),
                    }
                    rest = &after_open[end + 2..];
                }
                None => {
                    out.push_str("{{");
                    rest = after_open;
                }
            }
        }
        out.push_str(rest);
        out
    }
}

/// Known notification templates, keyed by `event_type`.
pub fn subject_for(event_type: &str) -> &'static str {
    match event_type {
        "order.paid" => "Order {{order_reference}} has been paid",
        "order.invoice" => "Your receipt for order {{order_reference}}",
        "order.cancelled" => "Order {{order_reference}} was cancelled",
        "order.complete" => "Order {{order_reference}} is complete",
        "user.invited" => "You've been invited to join {{tenant_name}}",
        "user.deletion_warning" => "Your account will be deleted soon",
        _ => "{{tenant_name}} notification",
    }
}

pub fn body_for(event_type: &str) -> &'static str {
    match event_type {
        "order.paid" => "Payment for order {{order_reference}} totaling {{total}} was received.",
        "order.invoice" => "Thanks for your order! Order {{order_reference}} totaling {{total}} has been paid.",
        "order.cancelled" => "Order {{order_reference}} was cancelled and any payment hold released.",
        "order.complete" => "Order {{order_reference}} has been completed. Thank you!",
        "user.invited" => "{{inviter_name}} has invited you to join {{tenant_name}} as a {{role}}.",
        "user.deletion_warning" => {
            "Your account has been inactive and is scheduled for permanent deletion in {{days_remaining}} days."
        }
        _ => "{{event_type}} for {{tenant_name}}.",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_known_variables() {
        let mut vars = HashMap::new();
        vars.insert("order_reference", "ORD-123".to_string());
        let rendered = Template::new(subject_for("order.paid")).render(&vars);
        assert_eq!(rendered, "Order ORD-123 has been paid");
    }

    #[test]
    fn leaves_unknown_placeholders_untouched() {
        let vars = HashMap::new();
        let rendered = Template::new("Hello {{name}}").render(&vars);
        assert_eq!(rendered, "Hello {{name}}");
    }

    #[test]
    fn handles_multiple_placeholders_in_one_template() {
        let mut vars = HashMap::new();
        vars.insert("inviter_name", "Alice".to_string());
        vars.insert("tenant_name", "Warung Kopi".to_string());
        vars.insert("role", "cashier".to_string());
        let rendered = Template::new(body_for("user.invited")).render(&vars);
        assert_eq!(rendered, "Alice has invited you to join Warung Kopi as a cashier.");
    }
}
