//! Built-in tools shipped with the bot.
//!
//! Tool backends are black boxes to the conversation core; these two are
//! bundled because they need nothing beyond the clock and a reminder sink.

pub mod clock;
pub mod remind;

use std::sync::Arc;

use chrono_tz::Tz;

use crate::registry::{RegistryError, ToolRegistry};

/// Register the built-in tools.
pub fn install_builtins(
    registry: &mut ToolRegistry,
    sink: Arc<dyn remind::ReminderSink>,
    tz: Tz,
) -> Result<(), RegistryError> {
    registry.register(clock::descriptor())?;
    registry.register(remind::descriptor(sink, tz))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};

    struct NullSink;

    #[async_trait]
    impl remind::ReminderSink for NullSink {
        async fn schedule(
            &self,
            _conversation_id: &str,
            _sender_id: &str,
            _fire_at: DateTime<Utc>,
            _message: &str,
        ) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn builtins_register_cleanly() {
        let mut registry = ToolRegistry::new();
        install_builtins(&mut registry, Arc::new(NullSink), chrono_tz::UTC).unwrap();
        assert!(registry.lookup("get_time").is_some());
        assert!(registry.lookup("create_reminder").is_some());
        assert_eq!(registry.definitions().len(), 2);
    }
}
