//
// Copyright (c) The Ursa Project Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::IpAddr;

use tracing::{debug, debug_span};

use crate::neighbor::fsm;
use crate::packet::consts::AttrType;
use crate::packet::error::AttrError;
use crate::packet::message::Message;

// BGP debug messages.
#[derive(Debug)]
pub enum Debug<'a> {
    InstanceCreate,
    InstanceStart,
    InstanceStop(InstanceInactiveReason),
    InstanceDelete,
    NbrCreate(&'a IpAddr),
    NbrDelete(&'a IpAddr),
    NbrFsmEvent(&'a IpAddr, &'a fsm::Event),
    NbrFsmTransition(&'a IpAddr, &'a fsm::State, &'a fsm::State),
    NbrMsgRx(&'a IpAddr, &'a Message),
    NbrMsgTx(&'a IpAddr, &'a Message),
    NbrAttrError(AttrType, AttrError),
}

// Reason why a BGP instance is inactive.
#[derive(Debug)]
pub enum InstanceInactiveReason {
    AdminDown,
    MissingRouterId,
}

// ===== impl Debug =====

impl Debug<'_> {
    // Log debug message using the tracing API.
    pub(crate) fn log(&self) {
        match self {
            Debug::InstanceCreate | Debug::InstanceStart
            | Debug::InstanceDelete => {
                debug!("{}", self);
            }
            Debug::InstanceStop(reason) => {
                debug!(%reason, "{}", self);
            }
            Debug::NbrCreate(addr) | Debug::NbrDelete(addr) => {
                debug_span!("neighbor", %addr).in_scope(|| {
                    debug!("{}", self);
                });
            }
            Debug::NbrFsmEvent(addr, event) => {
                debug_span!("neighbor", %addr).in_scope(|| {
                    debug_span!("fsm").in_scope(|| {
                        debug!(?event, "{}", self);
                    })
                });
            }
            Debug::NbrFsmTransition(addr, old_state, new_state) => {
                debug_span!("neighbor", %addr).in_scope(|| {
                    debug_span!("fsm").in_scope(|| {
                        debug!(?old_state, ?new_state, "{}", self);
                    })
                });
            }
            Debug::NbrMsgRx(addr, msg) => {
                debug_span!("neighbor", %addr).in_scope(|| {
                    debug_span!("input").in_scope(|| {
                        let data = serde_json::to_string(&msg).unwrap();
                        debug!(%data, "{}", self);
                    })
                });
            }
            Debug::NbrMsgTx(addr, msg) => {
                debug_span!("neighbor", %addr).in_scope(|| {
                    debug_span!("output").in_scope(|| {
                        let data = serde_json::to_string(&msg).unwrap();
                        debug!(%data, "{}", self);
                    })
                });
            }
            Debug::NbrAttrError(attr_type, action) => {
                debug!(?attr_type, ?action, "{}", self);
            }
        }
    }
}

impl std::fmt::Display for Debug<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Debug::InstanceCreate => {
                write!(f, "instance created")
            }
            Debug::InstanceStart => {
                write!(f, "starting instance")
            }
            Debug::InstanceStop(..) => {
                write!(f, "stopping instance")
            }
            Debug::InstanceDelete => {
                write!(f, "instance deleted")
            }
            Debug::NbrCreate(..) => {
                write!(f, "neighbor created")
            }
            Debug::NbrDelete(..) => {
                write!(f, "neighbor deleted")
            }
            Debug::NbrFsmEvent(..) => {
                write!(f, "event")
            }
            Debug::NbrFsmTransition(..) => {
                write!(f, "state transition")
            }
            Debug::NbrMsgRx(..) | Debug::NbrMsgTx(..) => {
                write!(f, "message")
            }
            Debug::NbrAttrError(..) => {
                write!(f, "malformed attribute")
            }
        }
    }
}

// ===== impl InstanceInactiveReason =====

impl std::fmt::Display for InstanceInactiveReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InstanceInactiveReason::AdminDown => {
                write!(f, "administrative status down")
            }
            InstanceInactiveReason::MissingRouterId => {
                write!(f, "missing router-id")
            }
        }
    }
}
