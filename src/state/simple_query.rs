//! Simple query protocol state machine.

use crate::buffer_set::BufferSet;
use crate::error::{Error, Result};
use crate::handler::{CopyKind, TextHandler};
use crate::protocol::backend::{
    CommandComplete, CopyBothResponse, CopyData, CopyDone, CopyInResponse, CopyOutResponse,
    DataRow, EmptyQueryResponse, ErrorResponse, RawMessage, ReadyForQuery, RowDescription,
    msg_type,
};
use crate::protocol::frontend::{write_copy_fail, write_query};
use crate::protocol::types::TransactionStatus;

use super::action::{Action, AsyncMessage};
use super::StateMachine;

/// Simple query state machine state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    WaitingResponse,
    ProcessingRows,
    DrainingCopyOut,
    WaitingReady,
    Finished,
}

const COPY_FAIL_MESSAGE: &str = "COPY via execute() is not supported; use copy() instead";

/// Simple query protocol state machine.
///
/// Drives the `Query`/simple-query sub-protocol: one `Query` message sent,
/// zero or more `(RowDescription, DataRow*, CommandComplete)` groups or bare
/// `CommandComplete`/`EmptyQueryResponse` messages received, terminated by
/// `ReadyForQuery`. A server error mid-stream is reported to the handler via
/// `server_error` rather than aborting the state machine: the protocol
/// still owes a `ReadyForQuery` and must keep reading until it arrives.
pub struct SimpleQueryStateMachine<'a, H> {
    state: State,
    handler: &'a mut H,
    transaction_status: TransactionStatus,
}

impl<'a, H: TextHandler> SimpleQueryStateMachine<'a, H> {
    /// Start a new simple query, writing the `Query` message into
    /// `buffer_set.write_buffer`.
    pub fn start(handler: &'a mut H, buffer_set: &mut BufferSet, query: &str) -> Self {
        buffer_set.write_buffer.clear();
        write_query(&mut buffer_set.write_buffer, query);
        Self {
            state: State::WaitingResponse,
            handler,
            transaction_status: TransactionStatus::Idle,
        }
    }

    fn handle_response(&mut self, buffer_set: &mut BufferSet) -> Result<Action> {
        let type_byte = buffer_set.type_byte;
        let payload = &buffer_set.read_buffer;

        match type_byte {
            msg_type::ROW_DESCRIPTION => {
                buffer_set.column_buffer.clear();
                buffer_set.column_buffer.extend_from_slice(payload);
                let cols = RowDescription::parse(&buffer_set.column_buffer)?;
                self.handler.result_start(cols)?;
                self.state = State::ProcessingRows;
                Ok(Action::ReadMessage)
            }
            msg_type::COMMAND_COMPLETE => {
                let complete = CommandComplete::parse(payload)?;
                self.handler.result_end(complete)?;
                self.state = State::WaitingResponse;
                Ok(Action::ReadMessage)
            }
            msg_type::EMPTY_QUERY_RESPONSE => {
                EmptyQueryResponse::parse(payload)?;
                self.handler.empty_query()?;
                self.state = State::WaitingResponse;
                Ok(Action::ReadMessage)
            }
            msg_type::READY_FOR_QUERY => {
                let ready = ReadyForQuery::parse(payload)?;
                self.transaction_status = ready.transaction_status().unwrap_or_default();
                self.state = State::Finished;
                Ok(Action::Finished)
            }
            msg_type::COPY_IN_RESPONSE => {
                CopyInResponse::parse(payload)?;
                self.handler.copy_response(CopyKind::In)?;
                self.fail_copy(buffer_set)
            }
            msg_type::COPY_OUT_RESPONSE => {
                CopyOutResponse::parse(payload)?;
                self.handler.copy_response(CopyKind::Out)?;
                self.state = State::DrainingCopyOut;
                Ok(Action::ReadMessage)
            }
            msg_type::COPY_BOTH_RESPONSE => {
                CopyBothResponse::parse(payload)?;
                self.handler.copy_response(CopyKind::Both)?;
                self.fail_copy(buffer_set)
            }
            _ => Err(Error::Protocol(format!(
                "unexpected message in query response: '{}'",
                type_byte as char
            ))),
        }
    }

    /// Abort a COPY IN/BOTH sub-protocol the server just opened: write
    /// `CopyFail` and wait for the `ErrorResponse`/`ReadyForQuery` pair the
    /// server replies with.
    fn fail_copy(&mut self, buffer_set: &mut BufferSet) -> Result<Action> {
        buffer_set.write_buffer.clear();
        write_copy_fail(&mut buffer_set.write_buffer, COPY_FAIL_MESSAGE);
        self.state = State::WaitingReady;
        Ok(Action::WriteAndReadMessage)
    }

    fn handle_copy_out(&mut self, buffer_set: &mut BufferSet) -> Result<Action> {
        let type_byte = buffer_set.type_byte;
        let payload = &buffer_set.read_buffer;

        match type_byte {
            msg_type::COPY_DATA => {
                CopyData::parse(payload)?;
                Ok(Action::ReadMessage)
            }
            msg_type::COPY_DONE => {
                CopyDone::parse(payload)?;
                Ok(Action::ReadMessage)
            }
            msg_type::COMMAND_COMPLETE => {
                CommandComplete::parse(payload)?;
                self.state = State::WaitingResponse;
                Ok(Action::ReadMessage)
            }
            msg_type::READY_FOR_QUERY => {
                let ready = ReadyForQuery::parse(payload)?;
                self.transaction_status = ready.transaction_status().unwrap_or_default();
                self.state = State::Finished;
                Ok(Action::Finished)
            }
            _ => Err(Error::Protocol(format!(
                "unexpected message while draining COPY OUT: '{}'",
                type_byte as char
            ))),
        }
    }

    fn handle_rows(&mut self, buffer_set: &mut BufferSet) -> Result<Action> {
        let type_byte = buffer_set.type_byte;
        let payload = &buffer_set.read_buffer;

        match type_byte {
            msg_type::DATA_ROW => {
                let cols = RowDescription::parse(&buffer_set.column_buffer)?;
                let row = DataRow::parse(payload)?;
                self.handler.row(cols, row)?;
                Ok(Action::ReadMessage)
            }
            msg_type::COMMAND_COMPLETE => {
                let complete = CommandComplete::parse(payload)?;
                self.handler.result_end(complete)?;
                self.state = State::WaitingResponse;
                Ok(Action::ReadMessage)
            }
            msg_type::READY_FOR_QUERY => {
                let ready = ReadyForQuery::parse(payload)?;
                self.transaction_status = ready.transaction_status().unwrap_or_default();
                self.state = State::Finished;
                Ok(Action::Finished)
            }
            msg_type::COPY_IN_RESPONSE => {
                CopyInResponse::parse(payload)?;
                self.handler.copy_response(CopyKind::In)?;
                self.fail_copy(buffer_set)
            }
            msg_type::COPY_OUT_RESPONSE => {
                CopyOutResponse::parse(payload)?;
                self.handler.copy_response(CopyKind::Out)?;
                self.state = State::DrainingCopyOut;
                Ok(Action::ReadMessage)
            }
            msg_type::COPY_BOTH_RESPONSE => {
                CopyBothResponse::parse(payload)?;
                self.handler.copy_response(CopyKind::Both)?;
                self.fail_copy(buffer_set)
            }
            _ => Err(Error::Protocol(format!(
                "unexpected message in row processing: '{}'",
                type_byte as char
            ))),
        }
    }

    fn handle_ready(&mut self, buffer_set: &mut BufferSet) -> Result<Action> {
        if buffer_set.type_byte != msg_type::READY_FOR_QUERY {
            return Err(Error::Protocol(format!(
                "expected ReadyForQuery, got '{}'",
                buffer_set.type_byte as char
            )));
        }
        let ready = ReadyForQuery::parse(&buffer_set.read_buffer)?;
        self.transaction_status = ready.transaction_status().unwrap_or_default();
        self.state = State::Finished;
        Ok(Action::Finished)
    }

    fn handle_async_message(&self, buffer_set: &BufferSet) -> Result<Action> {
        let msg = RawMessage::new(buffer_set.type_byte, &buffer_set.read_buffer);
        match msg.type_byte {
            msg_type::NOTICE_RESPONSE => {
                let notice = crate::protocol::backend::NoticeResponse::parse(msg.payload)?;
                Ok(Action::HandleAsyncMessageAndReadMessage(
                    AsyncMessage::Notice(notice.fields),
                ))
            }
            msg_type::PARAMETER_STATUS => {
                let param = crate::protocol::backend::auth::ParameterStatus::parse(msg.payload)?;
                Ok(Action::HandleAsyncMessageAndReadMessage(
                    AsyncMessage::ParameterChanged {
                        name: param.name.to_string(),
                        value: param.value.to_string(),
                    },
                ))
            }
            msg_type::NOTIFICATION_RESPONSE => {
                let notification =
                    crate::protocol::backend::auth::NotificationResponse::parse(msg.payload)?;
                Ok(Action::HandleAsyncMessageAndReadMessage(
                    AsyncMessage::Notification {
                        pid: notification.pid,
                        channel: notification.channel.to_string(),
                        payload: notification.payload.to_string(),
                    },
                ))
            }
            _ => Err(Error::Protocol(format!(
                "unknown async message type: '{}'",
                msg.type_byte as char
            ))),
        }
    }
}

impl<'a, H: TextHandler> StateMachine for SimpleQueryStateMachine<'a, H> {
    fn step(&mut self, buffer_set: &mut BufferSet) -> Result<Action> {
        let type_byte = buffer_set.type_byte;

        if RawMessage::is_async_type(type_byte) {
            return self.handle_async_message(buffer_set);
        }

        if type_byte == msg_type::ERROR_RESPONSE {
            let error = ErrorResponse::parse(&buffer_set.read_buffer)?;
            self.handler.server_error(error.into_error_fields())?;
            self.state = State::WaitingReady;
            return Ok(Action::ReadMessage);
        }

        match self.state {
            State::WaitingResponse => self.handle_response(buffer_set),
            State::ProcessingRows => self.handle_rows(buffer_set),
            State::DrainingCopyOut => self.handle_copy_out(buffer_set),
            State::WaitingReady => self.handle_ready(buffer_set),
            State::Finished => Ok(Action::Finished),
        }
    }

    fn transaction_status(&self) -> TransactionStatus {
        self.transaction_status
    }
}
