//! The per-call metadata record.

use super::AgiVariable;
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::fmt::Write;

const VARIABLE_COUNT: usize = AgiVariable::ALL.len();

/// Call metadata sent by Asterisk before the first command.
///
/// Built once by the metadata parser and never modified afterwards; the
/// channel hands out shared references only. Attributes Asterisk did not
/// send read as `""`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelVariables {
    values: [String; VARIABLE_COUNT],
}

impl ChannelVariables {
    pub(crate) fn set(&mut self, variable: AgiVariable, value: impl Into<String>) {
        self.values[variable as usize] = value.into();
    }

    /// Value of one attribute.
    pub fn get(&self, variable: AgiVariable) -> &str {
        &self.values[variable as usize]
    }

    /// All attributes with a non-empty value, in protocol order.
    pub fn iter(&self) -> impl Iterator<Item = (AgiVariable, &str)> {
        AgiVariable::ALL
            .iter()
            .map(move |v| (*v, self.get(*v)))
            .filter(|(_, value)| !value.is_empty())
    }

    /// Render back to the `agi_<name>: <value>` block Asterisk sends,
    /// including the terminating blank line.
    pub fn to_wire_block(&self) -> String {
        let mut block = String::new();
        for (variable, value) in self.iter() {
            let _ = writeln!(block, "{}: {}", variable.wire_name(), value);
        }
        block.push('\n');
        block
    }

    /// Whether the script was started over FastAGI (`agi_network: yes`).
    pub fn network(&self) -> bool {
        self.get(AgiVariable::Network)
            .eq_ignore_ascii_case("yes")
    }

    /// Path component of the `agi://host:port/<script>` URL.
    pub fn network_script(&self) -> &str {
        self.get(AgiVariable::NetworkScript)
    }

    /// Script name as requested by the dialplan.
    pub fn request(&self) -> &str {
        self.get(AgiVariable::Request)
    }

    /// Originating channel name (`SIP/1000-00000001`).
    pub fn channel(&self) -> &str {
        self.get(AgiVariable::Channel)
    }

    pub fn language(&self) -> &str {
        self.get(AgiVariable::Language)
    }

    /// Channel driver type (`SIP`, `PJSIP`, `DAHDI`).
    pub fn channel_type(&self) -> &str {
        self.get(AgiVariable::Type)
    }

    pub fn unique_id(&self) -> &str {
        self.get(AgiVariable::UniqueId)
    }

    /// Asterisk version string.
    pub fn version(&self) -> &str {
        self.get(AgiVariable::Version)
    }

    pub fn caller_id(&self) -> &str {
        self.get(AgiVariable::CallerId)
    }

    pub fn caller_id_name(&self) -> &str {
        self.get(AgiVariable::CallerIdName)
    }

    pub fn calling_pres(&self) -> &str {
        self.get(AgiVariable::CallingPres)
    }

    pub fn calling_ani2(&self) -> &str {
        self.get(AgiVariable::CallingAni2)
    }

    pub fn calling_ton(&self) -> &str {
        self.get(AgiVariable::CallingTon)
    }

    pub fn calling_tns(&self) -> &str {
        self.get(AgiVariable::CallingTns)
    }

    pub fn dnid(&self) -> &str {
        self.get(AgiVariable::Dnid)
    }

    pub fn rdnis(&self) -> &str {
        self.get(AgiVariable::Rdnis)
    }

    /// Dialplan context the script was started from.
    pub fn context(&self) -> &str {
        self.get(AgiVariable::Context)
    }

    pub fn extension(&self) -> &str {
        self.get(AgiVariable::Extension)
    }

    pub fn priority(&self) -> &str {
        self.get(AgiVariable::Priority)
    }

    /// `1.0` when started as EAGI, `0.0` otherwise.
    pub fn enhanced(&self) -> &str {
        self.get(AgiVariable::Enhanced)
    }

    pub fn account_code(&self) -> &str {
        self.get(AgiVariable::AccountCode)
    }

    pub fn thread_id(&self) -> &str {
        self.get(AgiVariable::ThreadId)
    }
}

impl Serialize for ChannelVariables {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(VARIABLE_COUNT))?;
        for variable in AgiVariable::ALL {
            map.serialize_entry(variable.as_str(), self.get(*variable))?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_variable_has_its_own_slot() {
        let mut vars = ChannelVariables::default();
        for variable in AgiVariable::ALL {
            vars.set(*variable, variable.wire_name());
        }
        for variable in AgiVariable::ALL {
            assert_eq!(vars.get(*variable), variable.wire_name());
        }
        assert_eq!(
            vars.iter()
                .count(),
            VARIABLE_COUNT
        );
    }

    #[test]
    fn test_unset_reads_empty() {
        let vars = ChannelVariables::default();
        assert_eq!(vars.channel(), "");
        assert!(!vars.network());
        assert_eq!(vars.iter().count(), 0);
    }

    #[test]
    fn test_typed_accessors() {
        let mut vars = ChannelVariables::default();
        vars.set(AgiVariable::Network, "YES");
        vars.set(AgiVariable::Type, "PJSIP");
        vars.set(AgiVariable::CallerIdName, "Alice");
        assert!(vars.network());
        assert_eq!(vars.channel_type(), "PJSIP");
        assert_eq!(vars.caller_id_name(), "Alice");
    }

    #[test]
    fn test_wire_block() {
        let mut vars = ChannelVariables::default();
        vars.set(AgiVariable::Channel, "SIP/1000-00000001");
        vars.set(AgiVariable::Request, "agi://127.0.0.1/ivr");
        assert_eq!(
            vars.to_wire_block(),
            "agi_request: agi://127.0.0.1/ivr\nagi_channel: SIP/1000-00000001\n\n"
        );
    }

    #[test]
    fn test_serialize_json() {
        let mut vars = ChannelVariables::default();
        vars.set(AgiVariable::Extension, "100");
        let json = serde_json::to_value(&vars).unwrap();
        assert_eq!(json["extension"], "100");
        assert_eq!(json["callerid"], "");
        assert_eq!(
            json.as_object()
                .unwrap()
                .len(),
            VARIABLE_COUNT
        );
    }
}
